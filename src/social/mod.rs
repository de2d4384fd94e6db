pub mod endpoints;
pub mod oauth1;
pub mod provider;
pub mod service;
pub mod twitter;
pub mod upstream;

pub use provider::{Provider, ProviderEndpoints, TwitterEndpoints};
pub use service::SocialService;
pub use twitter::RequestToken;
