//! # Codec Registry
//!
//! Builds the ordered set of codec plugins once at startup and resolves
//! format tags to plugins on `codec_open`.
//!
//! ## Registration Order
//!
//! | Family | Format | Filter names | Feature Flag |
//! |--------|--------|--------------|--------------|
//! | DSD | `d` | `dsd` | `decoder-dsd` |
//! | ALAC | `l` | `alac` | `decoder-ffmpeg` |
//! | WMA | `w` | `wma` | `decoder-ffmpeg` |
//! | AAC | `a` | `aac` | `decoder-core` |
//! | Vorbis | `o` | `ogg` | `decoder-core` |
//! | FLAC | `f` | `flac` | `decoder-core` |
//! | PCM | `p` | `pcm` | `decoder-core` |
//! | MP3 (mad) | `m` | `mp3`, `mad` | `decoder-core` |
//! | MP3 (mpg) | `m` | `mp3`, `mpg` | `decoder-core` |
//!
//! The two MP3 back-ends share one slot: `mpg` is only tried when `mad` was
//! filtered out or its provider could not create it.

use crate::decoder::pcm::PcmCodec;
use crate::error::{DecodeError, Result};
use crate::traits::Codec;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Maximum number of codecs the registry holds.
pub const MAX_CODECS: usize = 10;

/// Codec families known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecFamily {
    Dsd,
    Alac,
    Wma,
    Aac,
    Vorbis,
    Flac,
    Pcm,
    Mad,
    Mpg,
}

impl CodecFamily {
    /// Families in the order they are registered.
    pub const REGISTRATION_ORDER: [CodecFamily; 9] = [
        CodecFamily::Dsd,
        CodecFamily::Alac,
        CodecFamily::Wma,
        CodecFamily::Aac,
        CodecFamily::Vorbis,
        CodecFamily::Flac,
        CodecFamily::Pcm,
        CodecFamily::Mad,
        CodecFamily::Mpg,
    ];

    /// Format tag a plugin of this family answers to.
    pub fn format_id(&self) -> char {
        match self {
            CodecFamily::Dsd => 'd',
            CodecFamily::Alac => 'l',
            CodecFamily::Wma => 'w',
            CodecFamily::Aac => 'a',
            CodecFamily::Vorbis => 'o',
            CodecFamily::Flac => 'f',
            CodecFamily::Pcm => 'p',
            CodecFamily::Mad | CodecFamily::Mpg => 'm',
        }
    }

    /// Short names matched against the include/exclude filters.
    pub fn filter_names(&self) -> &'static [&'static str] {
        match self {
            CodecFamily::Dsd => &["dsd"],
            CodecFamily::Alac => &["alac"],
            CodecFamily::Wma => &["wma"],
            CodecFamily::Aac => &["aac"],
            CodecFamily::Vorbis => &["ogg"],
            CodecFamily::Flac => &["flac"],
            CodecFamily::Pcm => &["pcm"],
            CodecFamily::Mad => &["mp3", "mad"],
            CodecFamily::Mpg => &["mp3", "mpg"],
        }
    }

    /// Returns `true` if the crate was built with this family enabled.
    pub fn compiled_in(&self) -> bool {
        match self {
            CodecFamily::Dsd => cfg!(feature = "decoder-dsd"),
            CodecFamily::Alac | CodecFamily::Wma => cfg!(feature = "decoder-ffmpeg"),
            _ => cfg!(feature = "decoder-core"),
        }
    }
}

// ============================================================================
// Filters
// ============================================================================

/// Include/exclude lists of codec short names.
///
/// Names are separated by commas or whitespace and compared
/// case-insensitively. An exclusion always wins over an inclusion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecFilter {
    include: Option<HashSet<String>>,
    exclude: HashSet<String>,
}

impl CodecFilter {
    /// Build a filter. `include = None` admits every family not excluded.
    pub fn new(include: Option<&str>, exclude: &str) -> Self {
        Self {
            include: include.map(parse_names),
            exclude: parse_names(exclude),
        }
    }

    /// Returns `true` if a family with these names may be registered.
    pub fn allows(&self, names: &[&str]) -> bool {
        if names.iter().any(|name| self.exclude.contains(*name)) {
            return false;
        }
        match &self.include {
            Some(include) => names.iter().any(|name| include.contains(*name)),
            None => true,
        }
    }
}

fn parse_names(list: &str) -> HashSet<String> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

// ============================================================================
// Providers
// ============================================================================

/// Source of codec implementations.
///
/// Returning `None` marks the family as unavailable, e.g. because its
/// library could not be loaded.
pub trait CodecProvider {
    fn create(&self, family: CodecFamily) -> Option<Box<dyn Codec>>;
}

impl<F> CodecProvider for F
where
    F: Fn(CodecFamily) -> Option<Box<dyn Codec>>,
{
    fn create(&self, family: CodecFamily) -> Option<Box<dyn Codec>> {
        self(family)
    }
}

/// Codecs shipped with this crate: linear PCM only.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCodecs;

impl CodecProvider for BuiltinCodecs {
    fn create(&self, family: CodecFamily) -> Option<Box<dyn Codec>> {
        match family {
            CodecFamily::Pcm => Some(Box::new(PcmCodec::new())),
            _ => None,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Ordered, fixed-capacity set of codec plugins.
#[derive(Default)]
pub struct CodecRegistry {
    codecs: Vec<Box<dyn Codec>>,
}

impl CodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            codecs: Vec::with_capacity(MAX_CODECS),
        }
    }

    /// Register every compiled-in family the filter admits and the provider
    /// can create.
    pub fn initialize(filter: &CodecFilter, provider: &dyn CodecProvider) -> Self {
        debug!(?filter, "Initializing codec registry");
        let mut registry = Self::new();
        let mut mp3_registered = false;

        for family in CodecFamily::REGISTRATION_ORDER {
            if !family.compiled_in() || !filter.allows(family.filter_names()) {
                continue;
            }
            // mpg is the fallback for mad, never a second mp3 codec.
            if family == CodecFamily::Mpg && mp3_registered {
                continue;
            }
            let Some(codec) = provider.create(family) else {
                debug!(?family, "Codec family unavailable");
                continue;
            };
            match registry.register(codec) {
                Ok(()) => {
                    if family == CodecFamily::Mad || family == CodecFamily::Mpg {
                        mp3_registered = true;
                    }
                }
                Err(e) => warn!("{}", e),
            }
        }

        debug!(codecs = ?registry.names(), "Codec registry ready");
        registry
    }

    /// Append a codec after the ones already registered.
    pub fn register(&mut self, codec: Box<dyn Codec>) -> Result<()> {
        if self.codecs.len() >= MAX_CODECS {
            return Err(DecodeError::RegistryFull {
                capacity: MAX_CODECS,
                format: codec.format_id(),
            });
        }
        debug!(format = %codec.format_id(), name = codec.name(), "Registered codec");
        self.codecs.push(codec);
        Ok(())
    }

    /// Index of the first codec handling `format`.
    pub fn position(&self, format: char) -> Option<usize> {
        self.codecs.iter().position(|codec| codec.format_id() == format)
    }

    pub fn get(&self, index: usize) -> Option<&dyn Codec> {
        self.codecs.get(index).map(|codec| codec.as_ref())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut (dyn Codec + 'static)> {
        self.codecs.get_mut(index).map(|codec| codec.as_mut())
    }

    /// Format tags in registration order.
    pub fn format_ids(&self) -> Vec<char> {
        self.codecs.iter().map(|codec| codec.format_id()).collect()
    }

    /// Codec names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.codecs.iter().map(|codec| codec.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}
