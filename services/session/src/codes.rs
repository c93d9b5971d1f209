//! The session pipeline's slice of the closed error-code set (§7, §9
//! "consolidate on a small closed set of codes"). `repository::ErrorCode`
//! covers persistence failures; these three cover the gates the pipeline
//! itself enforces before a request ever reaches the repository.

/// No authenticated context, and the command is not `auth.*` (§4.6 step 3).
pub const AUTH_REQUIRED: i64 = 1401;
/// Authenticated, but not as a SysOp, for a `sysop.*` command.
pub const AUTH_FORBIDDEN: i64 = 1402;
/// Unrecognised command type. Kept numerically identical to
/// `repository::ErrorCode::UnknownCommand` (1403) since both name the same
/// condition from two different layers of the same system.
pub const UNKNOWN_COMMAND: i64 = 1403;
/// `data` failed JSON Schema validation against the command's registered
/// schema (§4.6 step 4).
pub const SCHEMA_INVALID: i64 = 1400;
