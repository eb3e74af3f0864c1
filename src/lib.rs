// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

pub mod chunked;
pub mod config;
pub mod counter;
pub mod exception;
pub mod limiter;
pub mod param;
pub mod path;
pub mod request;
pub mod response;
pub mod server;
pub mod util;

pub use config::Config;
pub use counter::{HitCounter, LockedCounter, RacyCounter};
pub use exception::Exception;
pub use limiter::RateLimiter;
pub use path::PathResolver;
pub use request::Request;
pub use response::Response;
pub use server::Server;
pub use util::HtmlBuilder;
