pub mod health_dto;
pub mod resolver_dto;
