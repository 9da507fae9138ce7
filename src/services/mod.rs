//! Business logic services

pub mod excel_helper;
pub mod import_history;
pub mod importer;
pub mod intake;
pub mod order_store;
pub mod session;
pub mod sheet;
pub mod template;
pub mod validator;
