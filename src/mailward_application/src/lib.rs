//! Application layer: one use case per admin-panel operation, each wired
//! to the core ports and driven through a request-scoped session context.

pub mod use_cases;

pub use use_cases::access_control::AccessControlUseCase;
pub use use_cases::change_password::ChangePasswordUseCase;
pub use use_cases::describe_tfa::DescribeTfaUseCase;
pub use use_cases::enroll_tfa::EnrollTfaUseCase;
pub use use_cases::login::{LoginResponse, LoginUseCase};
pub use use_cases::unset_tfa::UnsetTfaUseCase;
pub use use_cases::verify_tfa::VerifyTfaUseCase;
