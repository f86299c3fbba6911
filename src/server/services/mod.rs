pub mod app_services;
pub mod forwarder_services;
pub mod resolution_cache_services;
pub mod resolver_services;

pub use app_services::AppServices;
pub use forwarder_services::DynStreamForwarder;
pub use resolution_cache_services::DynResolutionCache;
pub use resolver_services::DynResolverClient;
