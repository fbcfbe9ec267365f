//! WLS protocol engine: request construction, response parsing, signature
//! verification and response validation.
//!
//! Nothing in this module performs I/O after start-up; session handling and
//! the HTTP surface live in [`crate::gate`] and [`crate::middleware`].

mod callback;
mod error;
mod request;
mod response;
mod signature;
mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use callback::{CALLBACK_PARAM, callback_values, strip_callback_param};
pub use error::{KeyError, RavenError, ResponseError};
pub use request::{AuthenticationRequest, PROTOCOL_VERSION, RequestBuilder};
pub use response::{AuthenticationResponse, ISSUE_FORMAT, RESPONSE_FIELDS, encode_signature};
pub use signature::{KeyStore, load_public_key};
pub use validator::{
    ResponseValidator, STATUS_CANCELLED, STATUS_SUCCESS, VerifiedIdentity,
};
