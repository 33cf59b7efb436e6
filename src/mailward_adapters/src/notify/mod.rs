pub mod redis_fail_ban;
