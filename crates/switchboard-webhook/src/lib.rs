// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generic webhook sink for the Switchboard gateway.
//!
//! Every dispatched protocol event can be forwarded, untransformed, to one
//! subscriber URL. Delivery is asynchronous and never blocks event dispatch.

pub mod relay;
pub mod signature;

pub use relay::{Envelope, RelayStatsSnapshot, WebhookRelay, WebhookSettings};
pub use signature::{SIGNATURE_HEADER, sign, verify};
