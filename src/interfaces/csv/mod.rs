pub mod command_reader;
pub mod outcome_writer;
pub mod wallet_reader;
