//! # Hub Types Crate
//!
//! Contract types that every independently built module and the host agree on.
//!
//! ## Design Principles
//!
//! - **Validate at the boundary**: untrusted JSON only becomes a typed value
//!   through a [`Decoder`]. Nothing downstream re-checks shape.
//! - **Envelope is immutable**: a [`MessageEnvelope`] is stamped once by the
//!   transport and never edited; decoding produces a new envelope.
//! - **Ports, not implementations**: the API client and toaster are traits;
//!   the host supplies the concrete services.

pub mod api;
pub mod decode;
pub mod envelope;
pub mod errors;
pub mod toast;

pub use api::{ApiClient, ApiClientExt, GetQuery, ParamValue, PostQuery, QueryData, QueryParams};
pub use decode::{Decoder, DecoderExt, DecoderRef};
pub use envelope::{MessageEnvelope, OutboundMessage, RawEnvelope};
pub use errors::*;
pub use toast::{ToastId, ToastKind, ToastOptions, Toaster};
