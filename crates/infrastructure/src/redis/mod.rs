//! Redis Pub/Sub 扇出适配器

pub mod fanout;

pub use fanout::{spawn_fanout_listener, RedisFanout};
