// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed record model
//!
//! A record is one immutable, positioned entry of a partition's log. Its body is
//! a closed sum type over the three record types:
//!
//! ```text
//! RecordBody::Command   { intent, value }
//! RecordBody::Event     { intent, value }
//! RecordBody::Rejection { intent, value, rejection_type, reason }
//! ```
//!
//! Rejection details only exist on the `Rejection` variant, so a command or an
//! event can never carry them.

mod entry;
mod intent;
mod metadata;
mod value;

pub use entry::{InvalidRecord, LogAppendEntry, Record, RecordBody, NULL_KEY, NULL_POSITION};
pub use intent::{Intent, JobBatchIntent, JobIntent, ValueType};
pub use metadata::{RecordMetadata, RecordType, RejectionType, PROTOCOL_VERSION};
pub use value::{ActivatedJob, JobBatchRecord, JobRecord, RecordValue};
