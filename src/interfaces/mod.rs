pub mod commands;
pub mod jsonl {
    pub mod request_reader;
}
