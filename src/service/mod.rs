pub mod chat_service;
pub mod dispatcher;
pub mod session;
pub mod transcript;
