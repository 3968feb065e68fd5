//! Named in-memory file space with engine command execution
//!
//! Mirrors the write-file / exec / read-file / delete-file cycle of a
//! command-style transcoder. Shared by the in-process engine and the
//! worker process.

use anyhow::{Context, Result};
use clipcut_types::EngineCommand;
use std::collections::HashMap;

use crate::{ops, pcm};

#[derive(Debug, Default)]
pub struct ScratchSpace {
    files: HashMap<String, Vec<u8>>,
}

impl ScratchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_file(&mut self, name: &str, data: Vec<u8>) {
        self.files.insert(name.to_string(), data);
    }

    pub fn read_file(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(|d| d.as_slice())
    }

    /// Returns whether the file existed
    pub fn delete_file(&mut self, name: &str) -> bool {
        self.files.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn decode_input(&self, name: &str) -> Result<pcm::PcmAudio> {
        let bytes = self
            .read_file(name)
            .with_context(|| format!("No such file: {}", name))?;
        pcm::decode(bytes, None).with_context(|| format!("Failed to decode {}", name))
    }

    /// Run a command; on failure no output file is created
    pub fn exec(&mut self, command: &EngineCommand) -> Result<()> {
        let output = match command {
            EngineCommand::Trim {
                input,
                offset,
                duration,
                ..
            } => {
                let audio = self.decode_input(input)?;
                ops::trim(&audio, *offset, *duration)?
            }
            EngineCommand::Volume { input, gain, .. } => {
                let audio = self.decode_input(input)?;
                ops::apply_volume(&audio, *gain)
            }
            EngineCommand::Concat { inputs, .. } => {
                let parts = inputs
                    .iter()
                    .map(|name| self.decode_input(name))
                    .collect::<Result<Vec<_>>>()?;
                ops::concat(&parts)?
            }
        };

        let encoded = pcm::encode_wav16(&output)?;
        self.write_file(command.output(), encoded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PcmAudio;

    #[test]
    fn test_exec_trim_writes_output() {
        let mut space = ScratchSpace::new();
        let input = pcm::encode_wav16(&PcmAudio::silence(3.0, 8000, 1)).unwrap();
        space.write_file("in.wav", input);

        space
            .exec(&EngineCommand::Trim {
                input: "in.wav".into(),
                output: "out.wav".into(),
                offset: 1.0,
                duration: Some(1.5),
            })
            .unwrap();

        let out = pcm::decode(space.read_file("out.wav").unwrap(), None).unwrap();
        assert!((out.duration() - 1.5).abs() < 1e-9);
        assert!(space.delete_file("out.wav"));
        assert!(!space.delete_file("out.wav"));
    }

    #[test]
    fn test_failed_exec_leaves_no_output() {
        let mut space = ScratchSpace::new();
        let result = space.exec(&EngineCommand::Volume {
            input: "missing.wav".into(),
            output: "out.wav".into(),
            gain: 2.0,
        });
        assert!(result.is_err());
        assert!(!space.contains("out.wav"));
    }
}
