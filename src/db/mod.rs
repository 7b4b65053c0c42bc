pub mod mock_db;
pub mod payment_repository;
pub mod plan_repository;
pub mod postgres_payment_repository;
pub mod postgres_plan_repository;
pub mod postgres_subscriber_repository;
pub mod subscriber_repository;
