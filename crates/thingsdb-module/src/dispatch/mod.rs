//! Request dispatch for module requests.
//!
//! A request package carries a MessagePack map:
//!
//! ```text
//! {scope: "//stuff", code: ".id()", vars: {...}}   QUERY
//! {scope: "//stuff", name: "proc", args: [...]}    RUN
//! ```
//!
//! The [`RequestDispatcher`] validates the envelope, runs the operation on the
//! current connection and hands the outcome to the translation functions in
//! [`response`], which build the reply package.

mod errors;
mod request;
pub mod response;
mod router;

pub use self::errors::RequestError;
pub use self::request::{Operation, RequestEnvelope};
pub use self::router::{DISPATCH_TARGET, RequestDispatcher};
