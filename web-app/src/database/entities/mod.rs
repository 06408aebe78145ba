pub mod migration;
pub mod pre_registro;
