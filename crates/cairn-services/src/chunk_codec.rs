//! Chunk codec — split a file into fixed-size chunk artifacts and rebuild it.
//!
//! Layout of a chunk set:
//!   {chunk_dir}/00000000
//!   {chunk_dir}/00000001
//!   ...
//!
//! Names are fixed-width, zero-padded decimal indices, so string order and
//! numeric order agree. `build` still sorts by the parsed integer and does
//! not rely on directory listing order.

use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Digits in a chunk file name.
pub const INDEX_WIDTH: usize = 8;

/// Largest index representable in [`INDEX_WIDTH`] digits.
pub const MAX_CHUNK_INDEX: u32 = 99_999_999;

/// One chunk artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub index: u32,
    pub path: PathBuf,
    pub len: u64,
}

/// The ordered chunks of one source file.
#[derive(Debug, Clone)]
pub struct ChunkSet {
    pub file_name: String,
    pub dir: PathBuf,
    pub chunk_size: usize,
    pub chunks: Vec<ChunkInfo>,
}

impl ChunkSet {
    pub fn total_bytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.len).sum()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("chunk size must be at least one byte")]
    ZeroChunkSize,

    #[error("source file {0} does not exist")]
    SourceMissing(PathBuf),

    #[error("output {0} already exists")]
    OutputExists(PathBuf),

    #[error("chunk directory {0} does not exist")]
    ChunkDirMissing(PathBuf),

    #[error("chunk directory {0} holds no chunks")]
    NoChunks(PathBuf),

    #[error("unexpected entry '{0}' in chunk directory")]
    UnexpectedEntry(String),

    #[error("chunk {0} is missing")]
    MissingChunk(u32),

    #[error("file needs more than {} chunks", MAX_CHUNK_INDEX as u64 + 1)]
    TooManyChunks,

    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_err<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> ChunkError + 'a {
    move |source| ChunkError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}

/// File name of the chunk with the given index.
pub fn chunk_name(index: u32) -> String {
    format!("{index:0width$}", width = INDEX_WIDTH)
}

/// Parse a chunk file name back into its index.
pub fn parse_chunk_name(name: &str) -> Option<u32> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// Split `source` into `chunk_size`-byte chunks written to `chunk_dir`.
///
/// Every chunk except the last holds exactly `chunk_size` bytes; the last
/// holds the remainder and is never padded. An empty source yields an empty
/// set. Any previous contents of `chunk_dir` are replaced.
pub fn split(source: &Path, chunk_dir: &Path, chunk_size: usize) -> Result<ChunkSet, ChunkError> {
    if chunk_size == 0 {
        return Err(ChunkError::ZeroChunkSize);
    }

    let mut input = match fs::File::open(source) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ChunkError::SourceMissing(source.to_path_buf()))
        }
        Err(e) => return Err(io_err("failed to open", source)(e)),
    };

    if chunk_dir.exists() {
        fs::remove_dir_all(chunk_dir).map_err(io_err("failed to clear", chunk_dir))?;
    }
    fs::create_dir_all(chunk_dir).map_err(io_err("failed to create", chunk_dir))?;

    let file_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    let mut chunks = Vec::new();
    let mut buf = Vec::with_capacity(chunk_size);
    for index in 0..=MAX_CHUNK_INDEX {
        buf.clear();
        // `take` + `read_to_end` keeps reading through short reads until the
        // chunk is full or the source ends.
        (&mut input)
            .take(chunk_size as u64)
            .read_to_end(&mut buf)
            .map_err(io_err("failed to read", source))?;
        if buf.is_empty() {
            break;
        }

        let path = chunk_dir.join(chunk_name(index));
        fs::write(&path, &buf).map_err(io_err("failed to write", &path))?;
        chunks.push(ChunkInfo {
            index,
            path,
            len: buf.len() as u64,
        });

        if buf.len() < chunk_size {
            break;
        }
    }

    // The loop only ends at MAX_CHUNK_INDEX with a full last chunk; check
    // whether the source still has data.
    if chunks.len() as u64 == MAX_CHUNK_INDEX as u64 + 1
        && chunks.last().map(|c| c.len) == Some(chunk_size as u64)
    {
        let mut probe = [0u8; 1];
        if input.read(&mut probe).map_err(io_err("failed to read", source))? > 0 {
            return Err(ChunkError::TooManyChunks);
        }
    }

    let set = ChunkSet {
        file_name,
        dir: chunk_dir.to_path_buf(),
        chunk_size,
        chunks,
    };
    tracing::info!(
        file = %set.file_name,
        chunks = set.chunks.len(),
        bytes = set.total_bytes(),
        dir = %chunk_dir.display(),
        "file split"
    );
    Ok(set)
}

/// List the chunks in `chunk_dir`, ordered by numeric index.
///
/// Fails on any non-chunk entry or a gap in the index sequence.
pub fn list_chunks(chunk_dir: &Path) -> Result<Vec<ChunkInfo>, ChunkError> {
    if !chunk_dir.is_dir() {
        return Err(ChunkError::ChunkDirMissing(chunk_dir.to_path_buf()));
    }

    let mut chunks = Vec::new();
    for entry in fs::read_dir(chunk_dir).map_err(io_err("failed to list", chunk_dir))? {
        let entry = entry.map_err(io_err("failed to list", chunk_dir))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let index = parse_chunk_name(&name).ok_or_else(|| ChunkError::UnexpectedEntry(name.clone()))?;
        let meta = entry.metadata().map_err(io_err("failed to stat", &entry.path()))?;
        if !meta.is_file() {
            return Err(ChunkError::UnexpectedEntry(name));
        }
        chunks.push(ChunkInfo {
            index,
            path: entry.path(),
            len: meta.len(),
        });
    }

    if chunks.is_empty() {
        return Err(ChunkError::NoChunks(chunk_dir.to_path_buf()));
    }

    chunks.sort_by_key(|c| c.index);
    for (expected, chunk) in chunks.iter().enumerate() {
        if chunk.index as usize != expected {
            return Err(ChunkError::MissingChunk(expected as u32));
        }
    }
    Ok(chunks)
}

/// Concatenate the chunks in `chunk_dir` into `output`. Returns bytes written.
///
/// The file is assembled under a temporary name beside `output` and linked
/// into place only after every chunk has been copied and synced. An existing
/// `output` is never replaced, and on failure nothing is left at `output`.
pub fn build(chunk_dir: &Path, output: &Path) -> Result<u64, ChunkError> {
    if output.exists() {
        return Err(ChunkError::OutputExists(output.to_path_buf()));
    }
    let chunks = list_chunks(chunk_dir)?;

    let tmp_path = partial_path(output);
    let result = assemble(&chunks, &tmp_path)
        .and_then(|written| publish(&tmp_path, output).map(|()| written));
    let _ = fs::remove_file(&tmp_path);

    let written = result?;
    tracing::info!(
        output = %output.display(),
        chunks = chunks.len(),
        bytes = written,
        "file built from chunks"
    );
    Ok(written)
}

/// Give the finished file at `tmp` its final name. Fails rather than
/// replacing anything already at `output`.
fn publish(tmp: &Path, output: &Path) -> Result<(), ChunkError> {
    match fs::hard_link(tmp, output) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(ChunkError::OutputExists(output.to_path_buf()))
        }
        Err(e) => Err(io_err("failed to publish", output)(e)),
    }
}

fn assemble(chunks: &[ChunkInfo], tmp_path: &Path) -> Result<u64, ChunkError> {
    let file = fs::File::create(tmp_path).map_err(io_err("failed to create", tmp_path))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0u64;
    for chunk in chunks {
        let mut input = fs::File::open(&chunk.path).map_err(io_err("failed to open", &chunk.path))?;
        written += io::copy(&mut input, &mut writer).map_err(io_err("failed to copy", &chunk.path))?;
    }
    writer.flush().map_err(io_err("failed to flush", tmp_path))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(io_err("failed to sync", tmp_path))?;
    Ok(written)
}

fn partial_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!(".{name}.partial"))
}
