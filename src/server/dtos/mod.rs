pub mod embed_dto;
pub mod health_dto;
