pub mod jwt;
pub mod period;
pub mod plan_limits;
