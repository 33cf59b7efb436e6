pub mod outcome;
pub mod password;
pub mod password_hash;
pub mod role;
pub mod tfa;
pub mod throttle;
pub mod u2f;
pub mod username;
