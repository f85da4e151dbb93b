pub mod context;
pub mod error;
pub mod request;
pub mod response;
pub mod route;
pub mod router;

pub use context::{Context, ContextHelper, ContextValue};
pub use error::SwitchboardError;
pub use request::{HttpMethod, Request};
pub use response::Response;
pub use route::{Route, RoutePattern};
pub use router::{RouteMatch, Router};
