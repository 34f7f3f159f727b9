use std::path::{Path, PathBuf};

pub const STORE_DIR: [&str; 2] = [".gene_chat", "store"];

#[must_use]
pub fn store_root(base: &Path) -> PathBuf {
    base.join(STORE_DIR[0]).join(STORE_DIR[1])
}

#[must_use]
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            ':' | '/' | '\\' | ' ' | '.' => '-',
            _ => c,
        })
        .collect()
}

#[must_use]
pub fn record_file_name(key: &str) -> String {
    format!("{}.json", sanitize_key(key))
}
