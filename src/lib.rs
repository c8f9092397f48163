pub mod auth;
pub mod cache;
pub mod config;
pub mod decider;
pub mod exception;
pub mod handler;
pub mod listing;
pub mod param;
pub mod request;
pub mod resolver;
pub mod response;
pub mod rules;
pub mod util;

pub use cache::CacheNegotiator;
pub use config::Config;
pub use decider::{ResponseDecider, ResponseDecision};
pub use exception::Exception;
pub use handler::{handle, ServeContext};
pub use listing::DirectoryLister;
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion};
pub use request::Request;
pub use resolver::PathResolver;
pub use response::Response;
pub use rules::RuleEngine;
pub use util::HtmlBuilder;
