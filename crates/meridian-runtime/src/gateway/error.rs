//! Maps [`CoreError`] onto the gRPC status codes in SPEC_FULL.md §6/§7 — the
//! single place this translation happens, so every service impl gets it
//! consistently instead of re-deriving it per handler.

use meridian_core::error::CoreError;
use tonic::Status;

pub fn to_status(err: CoreError) -> Status {
    match err {
        CoreError::NotFound(msg) => Status::not_found(msg),
        CoreError::Unauthenticated => Status::unauthenticated("authentication required"),
        CoreError::InvalidArgument(msg) => Status::invalid_argument(msg),
        CoreError::FailedPrecondition(msg) => Status::failed_precondition(msg),
        CoreError::Conflict { expected, actual } => Status::aborted(format!(
            "version conflict: expected {expected}, actual {actual}"
        )),
        CoreError::ResourceExhausted { message, .. } => Status::resource_exhausted(message),
        CoreError::Unavailable(msg) => Status::unavailable(msg),
        CoreError::Config(msg) => Status::internal(format!("configuration error: {msg}")),
        CoreError::Database(msg) => Status::internal(format!("database error: {msg}")),
        CoreError::Internal(msg) => Status::internal(msg),
        CoreError::Io(e) => Status::internal(format!("io error: {e}")),
        CoreError::Sql(e) => Status::internal(format!("sql error: {e}")),
        CoreError::Serialization(e) => Status::internal(format!("serialization error: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_not_found_code() {
        let status = to_status(CoreError::not_found("task"));
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[test]
    fn conflict_maps_to_aborted() {
        let status = to_status(CoreError::Conflict { expected: 1, actual: 2 });
        assert_eq!(status.code(), tonic::Code::Aborted);
    }

    #[test]
    fn failed_precondition_maps_through() {
        let status = to_status(CoreError::FailedPrecondition("already paused".into()));
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);
    }
}
