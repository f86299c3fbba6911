pub mod health_controller;
pub mod proxy_controller;
pub mod static_controller;
pub mod stream_controller;

pub use proxy_controller::ProxyController;
pub use static_controller::StaticController;
pub use stream_controller::StreamController;
