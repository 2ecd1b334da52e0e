//! Host capability probe backed by `which` and the filesystem.

use std::path::Path;

use crate::application::ports::{CommandRunner, HostProbe};

pub struct SystemProbe<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> SystemProbe<R> {
    #[must_use]
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> HostProbe for SystemProbe<R> {
    async fn has_program(&self, program: &str) -> bool {
        // Explicit paths are checked directly.
        if program.contains('/') {
            return Path::new(program).is_file();
        }
        self.runner
            .run("which", &[program])
            .await
            .is_ok_and(|o| o.status.success())
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }
}
