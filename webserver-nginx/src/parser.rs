//! Dotted-path editor over an Nginx config
//!
//! Keys address directives by name from the top level down:
//! `server.listen` is every `listen` inside the single `server` block.
//! Each segment but the last must match exactly one directive that owns a
//! block.

use std::path::{Path, PathBuf};

use webserver_core::fragment::write_file;
use webserver_core::{Error, Result};

use crate::config::{self, Block, Directive};
use crate::order::sort_directives;

/// A parsed config file plus the path it saves to
#[derive(Debug, Clone)]
pub struct Parser {
    config: Block,
    path: Option<PathBuf>,
}

impl Parser {
    /// Parse config text; the result has no save path until one is set
    pub fn parse(content: &str) -> Result<Self> {
        Ok(Self {
            config: config::parse_str(content)?,
            path: None,
        })
    }

    /// Parse a file and save back to it
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        tracing::debug!("loading {}", path.display());
        Ok(Self {
            config: config::parse_file(&path)?,
            path: Some(path),
        })
    }

    pub fn config(&self) -> &Block {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Block {
        &mut self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_config_path(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    // ============================================================
    // Lookup
    // ============================================================

    /// Every directive named by the last segment of `key`; empty when none match
    pub fn find(&self, key: &str) -> Result<Vec<&Directive>> {
        let (parents, last) = split_key(key);
        let block = resolve(&self.config, &parents)?;
        Ok(block.find(last))
    }

    /// The single directive at `key`
    pub fn find_one(&self, key: &str) -> Result<&Directive> {
        let mut found = self.find(key)?;
        match found.len() {
            0 => Err(Error::KeyNotFound(key.to_string())),
            1 => Ok(found.remove(0)),
            _ => Err(Error::AmbiguousKey(key.to_string())),
        }
    }

    /// The block owned by the directive at `key`
    pub fn block(&self, key: &str) -> Result<&Block> {
        resolve(&self.config, &segments(key))
    }

    pub fn block_mut(&mut self, key: &str) -> Result<&mut Block> {
        resolve_mut(&mut self.config, &segments(key))
    }

    // ============================================================
    // Mutation
    // ============================================================

    /// Remove every directive named by the last segment of `key`
    pub fn clear(&mut self, key: &str) -> Result<()> {
        let (parents, last) = split_key(key);
        let block = resolve_mut(&mut self.config, &parents)?;
        block.remove_all(last);
        Ok(())
    }

    /// Append `directives` to the block at `key`, or insert them after the
    /// first directive named `after`
    pub fn set(&mut self, key: &str, directives: Vec<Directive>, after: Option<&str>) -> Result<()> {
        let block = resolve_mut(&mut self.config, &segments(key))?;
        let index = match after {
            None => block.directives.len(),
            Some(anchor) => {
                block
                    .directives
                    .iter()
                    .position(|d| d.name == anchor)
                    .ok_or_else(|| Error::AnchorNotFound(anchor.to_string()))?
                    + 1
            }
        };
        block.directives.splice(index..index, directives);
        Ok(())
    }

    /// Append one simple directive, e.g. `set_one("server.listen", ["80"])`
    pub fn set_one<I, S>(&mut self, key: &str, params: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (parents, last) = split_key(key);
        if parents.is_empty() {
            return Err(Error::InvalidArgument(format!("key must have at least 2 parts: {key}")));
        }
        let parent_key = parents.join(".");
        self.set(&parent_key, vec![Directive::new(last, params)], None)
    }

    /// Swap every directive named by the last segment of `key` for
    /// `directives`, placed where the first old one stood
    pub fn replace(&mut self, key: &str, directives: Vec<Directive>) -> Result<()> {
        let (parents, last) = split_key(key);
        let block = resolve_mut(&mut self.config, &parents)?;
        let index = block.remove_all(last).unwrap_or(block.directives.len());
        block.directives.splice(index..index, directives);
        Ok(())
    }

    // ============================================================
    // Output
    // ============================================================

    pub fn dump(&self) -> String {
        config::dump(&self.config)
    }

    /// Sort directives and write the config to its path
    pub fn save(&mut self) -> Result<()> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| Error::InvalidArgument("config path not set".to_string()))?;
        sort_directives(&mut self.config.directives);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        write_file(&path, &(self.dump() + "\n"))?;
        tracing::debug!("saved {}", path.display());
        Ok(())
    }
}

fn segments(key: &str) -> Vec<&str> {
    key.split('.').collect()
}

fn split_key(key: &str) -> (Vec<&str>, &str) {
    match key.rsplit_once('.') {
        Some((parents, last)) => (segments(parents), last),
        None => (Vec::new(), key),
    }
}

/// Index of the one directive named `name`
fn unique_index(block: &Block, name: &str) -> Result<usize> {
    let mut matches = block
        .directives
        .iter()
        .enumerate()
        .filter(|(_, d)| d.name == name)
        .map(|(i, _)| i);
    match (matches.next(), matches.next()) {
        (None, _) => Err(Error::KeyNotFound(name.to_string())),
        (Some(_), Some(_)) => Err(Error::AmbiguousKey(name.to_string())),
        (Some(index), None) => Ok(index),
    }
}

fn resolve<'a>(mut block: &'a Block, parts: &[&str]) -> Result<&'a Block> {
    for part in parts {
        let index = unique_index(block, part)?;
        block = block.directives[index]
            .block
            .as_ref()
            .ok_or_else(|| Error::NotABlock(part.to_string()))?;
    }
    Ok(block)
}

fn resolve_mut<'a>(mut block: &'a mut Block, parts: &[&str]) -> Result<&'a mut Block> {
    for part in parts {
        let index = unique_index(block, part)?;
        block = block.directives[index]
            .block
            .as_mut()
            .ok_or_else(|| Error::NotABlock(part.to_string()))?;
    }
    Ok(block)
}
