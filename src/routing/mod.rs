//! Route templates, endpoints and the route table.
//!
//! Templates are `/`-separated segments: a literal, `{name}` for one captured
//! segment, or a final `*` for whatever remains of the path.

pub mod endpoint;
pub mod route;
pub mod table;

pub use endpoint::{
    Endpoint, EndpointBuilder, Handler, delete, get, head, options, patch, post, put, route,
};
pub use route::{Captures, Route, RouteError, TemplatePart};
pub use table::{RouteMatch, RouteTable};
