//! Application layer use cases for the vdisplay server.
//!
//! # What lives here?
//!
//! - **Capability ports** – traits for the privileged platform services the
//!   server needs ([`privileged_bridge::DisplayServices`],
//!   [`video_encoder::EncoderFactory`], [`video_encoder::HardwareEncoder`]) and
//!   for the outbound broadcast ([`frame_sink::FrameSink`]).  Concrete
//!   implementations are injected at construction time by `main.rs` or by tests.
//!
//! - **Use cases** – the display session lifecycle, input injection, screenshot
//!   capture, and the command dispatcher that ties them to the wire grammar.
//!
//! All code in this layer is synchronous.  The network layer runs it on Tokio's
//! blocking pool, and the encoder drain loop runs on its own OS thread.

pub mod dispatch;
pub mod display_session;
pub mod frame_sink;
pub mod input_injector;
pub mod privileged_bridge;
pub mod screenshot;
pub mod video_encoder;
