//! Maps a storage-layer [`StatusCode`] onto the engine's [`ErrorInfo`]
//! taxonomy, ported from jogasaki's `utils::handle_kvs_errors`. Warnings
//! (`NotFound`, `AlreadyExists`, the waitlist/rollback codes) are the
//! caller's problem and never produce an `ErrorInfo` here — callers check
//! `StatusCode::is_warning` themselves before reaching for this mapping.

use sqlexec_channel::{ErrorCode, ErrorInfo};
use sqlexec_storage::StatusCode;

/// `None` for `Ok` and for warning statuses (callers handle those without an
/// `ErrorInfo` at all); `Some` for every error status.
pub fn map_status_to_error(status: StatusCode) -> Option<ErrorInfo> {
    match status {
        StatusCode::Ok | StatusCode::NotFound | StatusCode::AlreadyExists => None,
        StatusCode::ErrSerializationFailure => Some(ErrorInfo::new(ErrorCode::CcException, "serialization failed")),
        StatusCode::ErrConflictOnWritePreserve => {
            Some(ErrorInfo::new(ErrorCode::ConflictOnWritePreserveException, "serialization failed due to conflict on write preserve"))
        }
        StatusCode::ErrReadAreaViolation => {
            Some(ErrorInfo::new(ErrorCode::ReadOperationOnRestrictedReadAreaException, "read operation outside read area"))
        }
        StatusCode::ErrWriteWithoutWritePreserve => Some(ErrorInfo::new(
            ErrorCode::LtxWriteOperationWithoutWritePreserveException,
            "ltx write operation outside write preserve",
        )),
        StatusCode::ErrWriteOperationByRtx => {
            Some(ErrorInfo::new(ErrorCode::WriteOperationByRtxException, "write operation by rtx"))
        }
        StatusCode::ErrInactiveTransaction => {
            Some(ErrorInfo::new(ErrorCode::InactiveTransactionException, "current transaction is inactive (maybe aborted already)"))
        }
        StatusCode::ErrInvalidKeyLength => {
            Some(ErrorInfo::new(ErrorCode::ValueTooLongException, "the key is too long to manipulate the kvs entry"))
        }
        StatusCode::ErrAborted => Some(ErrorInfo::new(ErrorCode::CcException, "transaction aborted")),
        StatusCode::ErrIo => Some(ErrorInfo::new(ErrorCode::DataCorruptionException, "storage i/o error")),
        StatusCode::ErrUnknown => Some(ErrorInfo::new(ErrorCode::InternalException, "unknown storage error")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_map_to_none() {
        assert!(map_status_to_error(StatusCode::NotFound).is_none());
        assert!(map_status_to_error(StatusCode::AlreadyExists).is_none());
        assert!(map_status_to_error(StatusCode::Ok).is_none());
    }

    #[test]
    fn serialization_failure_maps_to_cc_exception() {
        let info = map_status_to_error(StatusCode::ErrSerializationFailure).unwrap();
        assert_eq!(info.code, ErrorCode::CcException);
    }

    #[test]
    fn invalid_key_length_maps_to_value_too_long() {
        let info = map_status_to_error(StatusCode::ErrInvalidKeyLength).unwrap();
        assert_eq!(info.code, ErrorCode::ValueTooLongException);
    }
}
