//! Platform service implementations.
//!
//! Only the simulated platform ships in this crate.  It implements the same
//! capability traits a device binding would ([`DisplayServices`],
//! [`EncoderFactory`]) and is what `main.rs` wires in, so the whole pipeline
//! runs on any host.  The recording accessors make it the test double for
//! unit and integration tests as well.
//!
//! [`DisplayServices`]: crate::application::privileged_bridge::DisplayServices
//! [`EncoderFactory`]: crate::application::video_encoder::EncoderFactory

pub mod simulated;
