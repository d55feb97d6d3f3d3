// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! I/O helpers. */

use {
    crate::error::{HwpackError, Result},
    md5::Md5,
    sha2::{Digest, Sha256},
    std::{
        io::{Read, Write},
        path::Path,
    },
};

/// Compression format used by Debian primitives.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Compression {
    /// No compression (no extension).
    None,

    /// XZ compression (.xz extension).
    Xz,

    /// Gzip compression (.gz extension).
    Gzip,

    /// Zstandard compression (.zst extension).
    Zstd,
}

impl Compression {
    /// Filename extension for files compressed in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Xz => ".xz",
            Self::Gzip => ".gz",
            Self::Zstd => ".zst",
        }
    }

    /// Resolve the compression format from a filename extension like `.gz`.
    pub fn from_extension(extension: &str) -> Result<Self> {
        match extension {
            "" => Ok(Self::None),
            ".xz" => Ok(Self::Xz),
            ".gz" => Ok(Self::Gzip),
            ".zst" => Ok(Self::Zstd),
            _ => Err(HwpackError::DebUnknownCompression(extension.to_string())),
        }
    }

    /// The retrieval preference order for `Packages` indices.
    pub fn default_preferred_order() -> impl Iterator<Item = Compression> {
        [Self::Xz, Self::Gzip, Self::None].into_iter()
    }
}

/// Wrap a reader with transparent decompression.
pub fn read_decompressed(
    stream: Box<dyn Read>,
    compression: Compression,
) -> Result<Box<dyn Read>> {
    Ok(match compression {
        Compression::None => stream,
        Compression::Gzip => Box::new(libflate::gzip::Decoder::new(stream)?),
        Compression::Xz => Box::new(xz2::read::XzDecoder::new(stream)),
        Compression::Zstd => Box::new(zstd::Decoder::new(stream)?),
    })
}

/// Construct a gzip encoder whose header carries a fixed modification time.
///
/// The header has no filename, so output depends only on content and `mtime`.
/// The gzip header holds 32 bits of time; larger values are an error.
pub fn gzip_encoder<W: Write>(writer: W, mtime: u64) -> Result<libflate::gzip::Encoder<W>> {
    let mtime = u32::try_from(mtime).map_err(|_| {
        HwpackError::Archive(format!("modification time {} does not fit a gzip header", mtime))
    })?;
    let header = libflate::gzip::HeaderBuilder::new()
        .modification_time(mtime)
        .finish();

    Ok(libflate::gzip::Encoder::with_options(
        writer,
        libflate::gzip::EncodeOptions::new().header(header),
    )?)
}

/// Compress data in memory.
pub fn compress(data: &[u8], compression: Compression, mtime: u64) -> Result<Vec<u8>> {
    let mut buffer = vec![];

    match compression {
        Compression::None => {
            buffer.extend_from_slice(data);
        }
        Compression::Gzip => {
            let mut encoder = gzip_encoder(&mut buffer, mtime)?;
            encoder.write_all(data)?;
            encoder.finish().into_result()?;
        }
        Compression::Xz => {
            let mut encoder = xz2::write::XzEncoder::new(buffer, 6);
            encoder.write_all(data)?;
            buffer = encoder.finish()?;
        }
        Compression::Zstd => {
            let mut encoder = zstd::Encoder::new(buffer, 3)?;
            encoder.write_all(data)?;
            buffer = encoder.finish()?;
        }
    }

    Ok(buffer)
}

/// Digests and size of a piece of content.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MultiContentDigest {
    /// Hex encoded MD5.
    pub md5: String,
    /// Hex encoded SHA-256.
    pub sha256: String,
    /// Size in bytes.
    pub size: u64,
}

/// A content digester that simultaneously computes multiple digest types.
#[derive(Clone, Default)]
pub struct MultiDigester {
    md5: Md5,
    sha256: Sha256,
    size: u64,
}

impl MultiDigester {
    /// Write content into the digesters.
    pub fn update(&mut self, data: &[u8]) {
        self.md5.update(data);
        self.sha256.update(data);
        self.size += data.len() as u64;
    }

    /// Finish digesting content.
    pub fn finish(self) -> MultiContentDigest {
        MultiContentDigest {
            md5: hex::encode(self.md5.finalize()),
            sha256: hex::encode(self.sha256.finalize()),
            size: self.size,
        }
    }
}

/// A [Read] adapter that computes a [MultiContentDigest] as data is read.
pub struct DigestingReader<R> {
    digester: MultiDigester,
    source: R,
}

impl<R> DigestingReader<R> {
    /// Construct a new instance from a source reader.
    pub fn new(source: R) -> Self {
        Self {
            digester: MultiDigester::default(),
            source,
        }
    }

    /// Finish the stream.
    ///
    /// Returns the source reader and a resolved [MultiContentDigest].
    pub fn finish(self) -> (R, MultiContentDigest) {
        (self.source, self.digester.finish())
    }
}

impl<R: Read> Read for DigestingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let size = self.source.read(buf)?;
        self.digester.update(&buf[0..size]);

        Ok(size)
    }
}

/// Compute digests of the file at a path.
pub fn digest_path(path: &Path) -> Result<MultiContentDigest> {
    let mut reader = DigestingReader::new(std::fs::File::open(path)?);
    std::io::copy(&mut reader, &mut std::io::sink())?;

    Ok(reader.finish().1)
}

/// Compute digests of in-memory content.
pub fn digest_bytes(data: &[u8]) -> MultiContentDigest {
    let mut digester = MultiDigester::default();
    digester.update(data);
    digester.finish()
}
