use std::path::{ Path, PathBuf };

use hf_hub::api::sync::{ Api, ApiRepo };
use hf_hub::{ Repo, RepoType };
use log::{ debug, info };

use crate::error::{ ResponderError, Result };

#[derive(Debug, Clone, PartialEq)]
pub enum TokenizerFiles {
    Json(PathBuf),
    VocabMerges {
        vocab: PathBuf,
        merges: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum WeightsFile {
    SafeTensors(PathBuf),
    Pytorch(PathBuf),
}

/// Local paths of everything needed to build a [`super::ModelHandle`].
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointFiles {
    pub config: PathBuf,
    pub tokenizer: TokenizerFiles,
    pub tokenizer_config: Option<PathBuf>,
    pub weights: WeightsFile,
}

/// Somewhere checkpoint files can be fetched from by name.
pub trait FileSource {
    /// `Ok(None)` when the file simply is not there.
    fn fetch(&self, name: &str) -> Result<Option<PathBuf>>;

    fn fetch_required(&self, name: &str) -> Result<PathBuf> {
        self.fetch(name)?.ok_or_else(||
            ResponderError::Checkpoint(format!("checkpoint has no {}", name))
        )
    }

    fn describe(&self) -> String;
}

pub struct LocalDir {
    root: PathBuf,
}

impl LocalDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileSource for LocalDir {
    fn fetch(&self, name: &str) -> Result<Option<PathBuf>> {
        let path = self.root.join(name);
        Ok(if path.is_file() { Some(path) } else { None })
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

pub struct HubRepo {
    repo: ApiRepo,
    id: String,
    revision: String,
}

impl HubRepo {
    pub fn new(id: &str, revision: &str) -> Result<Self> {
        let api = Api::new()?;
        let repo = api.repo(
            Repo::with_revision(id.to_string(), RepoType::Model, revision.to_string())
        );
        Ok(Self { repo, id: id.to_string(), revision: revision.to_string() })
    }
}

impl FileSource for HubRepo {
    fn fetch(&self, name: &str) -> Result<Option<PathBuf>> {
        match self.repo.get(name) {
            Ok(path) => Ok(Some(path)),
            Err(e) => {
                debug!("{} not available from {}: {}", name, self.id, e);
                Ok(None)
            }
        }
    }

    // Surfaces the hub error itself (unknown repo, network, auth) for mandatory files.
    fn fetch_required(&self, name: &str) -> Result<PathBuf> {
        Ok(self.repo.get(name)?)
    }

    fn describe(&self) -> String {
        format!("hub repo {}@{}", self.id, self.revision)
    }
}

pub fn resolve_from(source: &dyn FileSource) -> Result<CheckpointFiles> {
    let config = source.fetch_required("config.json")?;

    let tokenizer = match source.fetch("tokenizer.json")? {
        Some(path) => TokenizerFiles::Json(path),
        None => {
            match (source.fetch("vocab.json")?, source.fetch("merges.txt")?) {
                (Some(vocab), Some(merges)) => TokenizerFiles::VocabMerges { vocab, merges },
                _ => {
                    return Err(
                        ResponderError::Checkpoint(
                            format!(
                                "{} has neither tokenizer.json nor vocab.json + merges.txt",
                                source.describe()
                            )
                        )
                    );
                }
            }
        }
    };
    let tokenizer_config = source.fetch("tokenizer_config.json")?;

    let weights = match source.fetch("model.safetensors")? {
        Some(path) => WeightsFile::SafeTensors(path),
        None =>
            match source.fetch("pytorch_model.bin")? {
                Some(path) => WeightsFile::Pytorch(path),
                None => {
                    return Err(
                        ResponderError::Checkpoint(
                            format!(
                                "{} has neither model.safetensors nor pytorch_model.bin",
                                source.describe()
                            )
                        )
                    );
                }
            }
    };

    Ok(CheckpointFiles { config, tokenizer, tokenizer_config, weights })
}

/// An existing directory is read in place, anything else is treated as a hub repo id.
pub fn resolve(checkpoint: &str, revision: &str) -> Result<CheckpointFiles> {
    if checkpoint.trim().is_empty() {
        return Err(ResponderError::Checkpoint("empty checkpoint identifier".into()));
    }
    let files = if Path::new(checkpoint).is_dir() {
        resolve_from(&LocalDir::new(checkpoint))?
    } else {
        resolve_from(&HubRepo::new(checkpoint, revision)?)?
    };
    info!("Resolved checkpoint '{}': weights={:?}", checkpoint, files.weights);
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), "{}").unwrap();
        }
    }

    #[test]
    fn prefers_tokenizer_json_and_safetensors() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            &[
                "config.json",
                "tokenizer.json",
                "vocab.json",
                "merges.txt",
                "model.safetensors",
                "pytorch_model.bin",
            ]
        );
        let files = resolve(dir.path().to_str().unwrap(), "main").unwrap();
        assert_eq!(files.tokenizer, TokenizerFiles::Json(dir.path().join("tokenizer.json")));
        assert_eq!(files.weights, WeightsFile::SafeTensors(dir.path().join("model.safetensors")));
        assert_eq!(files.tokenizer_config, None);
    }

    #[test]
    fn falls_back_to_vocab_merges_and_pytorch_weights() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            &["config.json", "vocab.json", "merges.txt", "tokenizer_config.json", "pytorch_model.bin"]
        );
        let files = resolve_from(&LocalDir::new(dir.path())).unwrap();
        assert_eq!(files.tokenizer, TokenizerFiles::VocabMerges {
            vocab: dir.path().join("vocab.json"),
            merges: dir.path().join("merges.txt"),
        });
        assert_eq!(files.weights, WeightsFile::Pytorch(dir.path().join("pytorch_model.bin")));
        assert!(files.tokenizer_config.is_some());
    }

    #[test]
    fn missing_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["tokenizer.json", "model.safetensors"]);
        let err = resolve_from(&LocalDir::new(dir.path())).unwrap_err();
        assert!(matches!(err, ResponderError::Checkpoint(_)));
    }

    #[test]
    fn missing_weights_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["config.json", "tokenizer.json"]);
        let err = resolve_from(&LocalDir::new(dir.path())).unwrap_err();
        assert!(err.to_string().contains("model.safetensors"));
    }

    #[test]
    fn half_a_bpe_tokenizer_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["config.json", "vocab.json", "model.safetensors"]);
        assert!(resolve_from(&LocalDir::new(dir.path())).is_err());
    }

    #[test]
    fn blank_identifier_is_rejected() {
        assert!(matches!(resolve("  ", "main"), Err(ResponderError::Checkpoint(_))));
    }
}
