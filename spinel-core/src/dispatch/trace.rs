use std::io::Write as _;

use crate::{DispatchId, DispatchStage, Handle};

#[derive(serde::Serialize)]
pub(crate) enum Action {
    Init {
        label: String,
        dispatch_count: u32,
        handle_count: u32,
        queue_count: usize,
    },
    Acquire {
        id: DispatchId,
        stage: DispatchStage,
    },
    HappensAfter {
        after: DispatchId,
        before: DispatchId,
    },
    RegisterHandle {
        id: DispatchId,
        handle: Handle,
    },
    HandlesComplete(Vec<Handle>),
    Submit {
        id: DispatchId,
        wait_count: u32,
    },
    Launch {
        id: DispatchId,
        queue: usize,
    },
    Wait {
        fences: usize,
        all: bool,
        ready: bool,
    },
    Retire(DispatchId),
    DeviceLost,
}

pub struct Trace {
    file: std::fs::File,
    config: ron::ser::PrettyConfig,
}

impl Trace {
    pub fn new(path: &std::path::Path) -> Result<Self, std::io::Error> {
        log::info!("Tracing into '{:?}'", path);
        let mut file = std::fs::File::create(path.join("trace.ron"))?;
        file.write_all(b"[\n")?;
        Ok(Trace {
            file,
            config: ron::ser::PrettyConfig::default(),
        })
    }

    pub(crate) fn add(&mut self, action: Action) {
        match ron::ser::to_string_pretty(&action, self.config.clone()) {
            Ok(string) => {
                let _ = writeln!(self.file, "{},", string);
            }
            Err(e) => {
                log::warn!("RON serialization failure: {:?}", e);
            }
        }
    }
}

impl Drop for Trace {
    fn drop(&mut self) {
        let _ = self.file.write_all(b"]");
    }
}
