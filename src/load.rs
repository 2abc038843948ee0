use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Open `path` read-only, run `transform` over the stream and return what it
/// computes. The handle is dropped on every exit path, including an `Err` or
/// a panic out of `transform`.
pub fn load<T, F>(path: impl AsRef<Path>, transform: F) -> Result<T>
where
    F: FnOnce(&mut BufReader<File>) -> Result<T>,
{
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::new(file);

    transform(&mut reader).with_context(|| format!("load {}", path.display()))
}
