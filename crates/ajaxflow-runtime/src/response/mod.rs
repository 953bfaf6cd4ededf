//! Response envelopes and how they are applied.
//!
//! - [`envelope`]: wire format and decoding
//! - [`evaluate`]: suspending script detection
//! - [`head`]: `<head>` merging with de-duplication
//! - [`processor`]: ordered application against the document

mod envelope;
mod evaluate;
mod head;
mod processor;

pub use envelope::{decode, Directive, Envelope, EnvelopeError, ENCODING_WICKET1, ROOT_ELEMENT};
pub use evaluate::{split_evaluate, EvalScript};
pub use head::{strip_session_id, HeadContributor, HeadReport};
pub use processor::{snapshot, ProcessReport, ResponseProcessor};
