pub mod access_control;
pub mod change_password;
pub mod describe_tfa;
pub mod enroll_tfa;
pub mod login;
pub mod unset_tfa;
pub mod verify_tfa;
