use super::test_helpers::*;
use super::*;
use crate::error::FailureReason;
use crate::transfer::{ChunkDisposition, TransferState};
use crate::types::{AssetOutcome, AssetType};
use bytes::Bytes;
use std::time::Duration;
