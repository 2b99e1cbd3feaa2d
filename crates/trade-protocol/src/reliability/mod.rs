//! Reliability layer: acknowledgement correlation and mailbox redelivery.

pub(crate) mod ack;
pub(crate) mod mailbox;

pub(crate) use ack::{apply_ack, send_ack, AckEffect};
pub(crate) use mailbox::resend_unacknowledged;
