use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use application::{AccessClaims, SendDestination, TokenPair};
use domain::{Message, Room, RoomId, Timestamp, UserId};

use crate::error::ApiError;
use crate::state::AppState;
use crate::stream::MessageStreamConnection;

#[derive(Debug, Deserialize)]
struct RegisterPayload {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RefreshPayload {
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct CreateRoomPayload {
    name: String,
    member_ids: Vec<Uuid>,
    #[serde(default)]
    is_dialog: bool,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    /// 已有房间；与 `to` 二选一
    room_id: Option<Uuid>,
    /// 对话目标用户；首条消息时惰性创建对话房间
    to: Option<Uuid>,
    text: String,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page_size: Option<u32>,
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// 浏览器 WebSocket 客户端无法携带请求头时的令牌通道
    token: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token.token.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RoomResponse {
    id: RoomId,
    name: String,
    created_at: Timestamp,
    is_dialog: bool,
    member_ids: Vec<UserId>,
    last_message_time: Timestamp,
}

impl From<Room> for RoomResponse {
    fn from(room: Room) -> Self {
        Self {
            id: room.id,
            name: room.name,
            created_at: room.created_at,
            is_dialog: room.is_dialog,
            member_ids: room.member_ids,
            last_message_time: room.last_message_time,
        }
    }
}

#[derive(Debug, Serialize)]
struct RoomListResponse {
    rooms: Vec<RoomResponse>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct MessageListResponse {
    messages: Vec<Message>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageResponse {
    room_id: RoomId,
    message: Message,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/rooms", post(create_room).get(list_rooms))
        .route("/rooms/{room_id}/messages", get(list_messages))
        .route("/messages", post(send_message))
        .route("/messages/stream", get(message_stream))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// 从 Authorization 头解析并校验访问令牌。
fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AccessClaims, ApiError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("invalid authorization header format"))?;

    Ok(state.token_verifier.verify(token)?)
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let pair = state
        .auth_service
        .register(&payload.username, &payload.password)
        .await?;
    Ok((StatusCode::CREATED, Json(pair.into())))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<TokenResponse>, ApiError> {
    let pair = state
        .auth_service
        .login(&payload.username, &payload.password)
        .await?;
    Ok(Json(pair.into()))
}

async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshPayload>,
) -> Result<Json<TokenResponse>, ApiError> {
    let pair = state.auth_service.refresh(&payload.refresh_token).await?;
    Ok(Json(pair.into()))
}

async fn create_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateRoomPayload>,
) -> Result<(StatusCode, Json<RoomResponse>), ApiError> {
    let claims = authenticate(&state, &headers)?;
    let member_ids = payload.member_ids.into_iter().map(UserId::from).collect();
    let room = state
        .room_service
        .create_room(claims.subject, payload.name, member_ids, payload.is_dialog)
        .await?;
    Ok((StatusCode::CREATED, Json(room.into())))
}

async fn list_rooms(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<RoomListResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let page = state
        .room_service
        .list_rooms(
            claims.subject,
            query.page_token.as_deref(),
            query.page_size.unwrap_or(20),
        )
        .await?;
    Ok(Json(RoomListResponse {
        rooms: page.rooms.into_iter().map(RoomResponse::from).collect(),
        next_page_token: page.next_page_token,
    }))
}

async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<MessageListResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let page = state
        .message_service
        .list_messages(
            claims.subject,
            RoomId::from(room_id),
            query.page_token.as_deref(),
            query.page_size.unwrap_or(20),
        )
        .await?;
    Ok(Json(MessageListResponse {
        messages: page.messages,
        next_page_token: page.next_page_token,
    }))
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SendMessagePayload>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;

    let destination = match (payload.room_id, payload.to) {
        (Some(room_id), None) => SendDestination::Room(RoomId::from(room_id)),
        (None, Some(recipient)) => SendDestination::User(UserId::from(recipient)),
        _ => {
            return Err(ApiError::bad_request(
                "exactly one of room_id and to must be set",
            ))
        }
    };

    let sent = state
        .message_service
        .send_message(claims.subject, destination, payload.text)
        .await?;
    Ok(Json(SendMessageResponse {
        room_id: sent.room.id,
        message: sent.message,
    }))
}

/// 长连消息流入口：升级为 WebSocket，按令牌身份注册会话。
async fn message_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    // 优先 Authorization 头；浏览器客户端可退回 token 查询参数
    let claims = match authenticate(&state, &headers) {
        Ok(claims) => claims,
        Err(header_err) => match query.token.as_deref() {
            Some(token) => state.token_verifier.verify(token)?,
            None => return Err(header_err),
        },
    };

    Ok(ws.on_upgrade(move |socket| MessageStreamConnection::new(state, claims).run(socket)))
}
