use super::{ComponentContext, ComponentProcedure};
use crate::quiesce::GcQuiescer;
use crate::remote::{remote_command_failed, RemoteInput, RemoteSink};
use applisnap_core::errors::Result;

/// A dataset moved as one file by opaque appliance export/import commands
///
/// Backup streams the export command's stdout into `<snapshot>/<file>`;
/// restore streams that file into the import command's stdin.
#[derive(Debug, Clone)]
pub struct RemoteArchive {
    export_command: &'static str,
    import_command: &'static str,
    file_name: &'static str,
    quiesce: bool,
}

impl RemoteArchive {
    pub fn new(
        export_command: &'static str,
        import_command: &'static str,
        file_name: &'static str,
    ) -> Self {
        Self {
            export_command,
            import_command,
            file_name,
            quiesce: false,
        }
    }

    /// Hold compaction off while exporting
    pub fn quiesced(mut self) -> Self {
        self.quiesce = true;
        self
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }
}

impl ComponentProcedure for RemoteArchive {
    fn backup(&self, ctx: &ComponentContext<'_>) -> Result<()> {
        let guard = if self.quiesce {
            Some(GcQuiescer::new(ctx.config, ctx.channel, ctx.clock, ctx.cancel).quiesce()?)
        } else {
            None
        };

        let dest = ctx.snapshot_dir.join(self.file_name);
        let output = ctx
            .channel
            .run(self.export_command, RemoteInput::None, RemoteSink::File(&dest))?;
        if !output.success() {
            return Err(remote_command_failed(
                "export",
                self.export_command,
                output.status,
            ));
        }

        if let Some(mut guard) = guard {
            guard.release()?;
        }
        Ok(())
    }

    fn restore(&self, ctx: &ComponentContext<'_>) -> Result<()> {
        let src = ctx.snapshot_dir.join(self.file_name);
        let output = ctx
            .channel
            .run(self.import_command, RemoteInput::File(&src), RemoteSink::Discard)?;
        if !output.success() {
            return Err(remote_command_failed(
                "import",
                self.import_command,
                output.status,
            ));
        }
        Ok(())
    }
}
