use crate::config::{Config, SourceSpec};
use crate::input::{raw_stdin, Command, InputDecoder};
use crate::layout::TermSize;
use crate::reader::Source;
use crate::resources::ResourceRegistry;
use crate::screen::{Flow, Screen};
use crate::supervisor::{ProcessSupervisor, SpawnedProcess};
use crate::terminal::{self, TerminalGuard};
use crate::window::Window;
use anyhow::{bail, Context, Result};
use log::{info, warn};
use std::fs::File;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Opens every configured source in pane order. Each spawned command contributes its
/// stdout and then its stderr.
pub fn open_sources(
    specs: &[SourceSpec],
    supervisor: &mut ProcessSupervisor,
) -> Result<Vec<Source>> {
    let mut sources = Vec::with_capacity(specs.len());
    for spec in specs {
        match spec {
            SourceSpec::File(path) => {
                let file = File::open(path)
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                sources.push(Source::file(path.display().to_string(), file));
            }
            SourceSpec::Command(command) => {
                let SpawnedProcess { stdout, stderr, .. } = supervisor.spawn(command)?;
                sources.push(Source::socket(format!("{command} (stdout)"), stdout));
                sources.push(Source::socket(format!("{command} (stderr)"), stderr));
            }
        }
    }
    Ok(sources)
}

/// Runs the pager until the user quits. Setup failures return early with an error;
/// once readers are running, teardown happens on every path: terminal restored, readers
/// cancelled and joined, their streams closed, then spawned commands shut down.
pub async fn run(config: Config) -> Result<()> {
    let mut supervisor = ProcessSupervisor::new(config.shell.clone(), config.shutdown);
    let sources = open_sources(&config.sources, &mut supervisor)?;
    if sources.is_empty() {
        bail!("no input sources: pass a FILE or --spawn COMMAND");
    }
    info!("paging {} sources", sources.len());

    let (registry, registrar) = ResourceRegistry::new();
    let mut windows: Vec<Window> = sources.into_iter().map(Window::new).collect();
    for window in &mut windows {
        window.spawn_reader(&registrar);
    }
    drop(registrar);
    let mut screen = Screen::new(windows);

    let outcome = interact(&mut screen, config.frame_interval).await;

    screen.close().await;
    registry.drain();
    let report = supervisor.shutdown().await;
    if !report.killed.is_empty() {
        let killed = report.killed.len();
        warn!("killed {killed} commands that ignored SIGTERM");
    }
    outcome
}

async fn interact(screen: &mut Screen, frame_interval: Duration) -> Result<()> {
    let _terminal = TerminalGuard::enter()?;
    let mut input = InputDecoder::new(raw_stdin().context("Failed to open stdin")?);
    let mut output = io::stdout();
    event_loop(
        screen,
        &mut input,
        &mut output,
        terminal::size,
        frame_interval,
    )
    .await
}

/// Main loop: apply every pending key press, redraw if anything changed, sleep.
pub async fn event_loop<R: Read, W: Write>(
    screen: &mut Screen,
    input: &mut InputDecoder<R>,
    output: &mut W,
    size: impl Fn() -> io::Result<TermSize>,
    frame_interval: Duration,
) -> Result<()> {
    loop {
        loop {
            match input.poll().context("Failed to read keyboard input")? {
                Command::None => break,
                command => {
                    if screen.apply(command) == Flow::Quit {
                        info!("quit requested");
                        return Ok(());
                    }
                }
            }
        }
        let term_size = size().context("Failed to query terminal size")?;
        screen.render(output, term_size)?;
        tokio::time::sleep(frame_interval).await;
    }
}

#[cfg(test)]
mod test {
    use crate::app::{event_loop, open_sources};
    use crate::config::SourceSpec;
    use crate::input::InputDecoder;
    use crate::layout::TermSize;
    use crate::reader::SourceHandle;
    use crate::resources::ResourceRegistry;
    use crate::screen::Screen;
    use crate::supervisor::{ProcessSupervisor, ShutdownPolicy};
    use crate::window::Window;
    use std::io::{self, Read, Write};
    use std::path::PathBuf;
    use std::sync::mpsc;
    use std::time::Duration;

    /// Keys fed one read at a time; empty reads in between, like a polling terminal.
    struct Keys(mpsc::Receiver<Vec<u8>>);

    impl Read for Keys {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.try_recv() {
                Ok(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Err(_) => Ok(0),
            }
        }
    }

    #[test]
    fn opens_files_and_commands_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hello").unwrap();
        let mut supervisor = ProcessSupervisor::new("/bin/sh", ShutdownPolicy::default());

        let sources = open_sources(
            &[
                SourceSpec::Command("true".into()),
                SourceSpec::File(file.path().to_path_buf()),
            ],
            &mut supervisor,
        )
        .unwrap();

        let titles: Vec<&str> = sources.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles[0], "true (stdout)");
        assert_eq!(titles[1], "true (stderr)");
        assert_eq!(titles[2], file.path().display().to_string());
        assert!(matches!(sources[2].handle, SourceHandle::File(_)));
        assert_eq!(supervisor.pids().len(), 1);
    }

    #[test]
    fn missing_file_is_fatal() {
        let mut supervisor = ProcessSupervisor::new("/bin/sh", ShutdownPolicy::default());
        let error = open_sources(
            &[SourceSpec::File(PathBuf::from("/definitely/not/here.log"))],
            &mut supervisor,
        )
        .unwrap_err();
        assert!(error.to_string().contains("/definitely/not/here.log"));
    }

    #[tokio::test]
    async fn pages_live_command_output_until_quit() {
        let mut supervisor = ProcessSupervisor::new("/bin/sh", ShutdownPolicy::default());
        let sources = open_sources(
            &[SourceSpec::Command(
                "for i in 1 2 3; do echo out $i; done; echo oops >&2; sleep 30".into(),
            )],
            &mut supervisor,
        )
        .unwrap();

        let (registry, registrar) = ResourceRegistry::new();
        let mut windows: Vec<Window> = sources.into_iter().map(Window::new).collect();
        for window in &mut windows {
            window.spawn_reader(&registrar);
        }
        drop(registrar);
        let mut screen = Screen::new(windows);

        let (keys, rx) = mpsc::channel();
        let mut input = InputDecoder::new(Keys(rx));
        let mut output = Vec::new();
        let size = || Ok(TermSize::new(30, 12));
        let frame = Duration::from_millis(5);

        // Quit once both panes have content.
        let feeder = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            keys.send(b"h".to_vec()).unwrap();
            keys.send(b"q".to_vec()).unwrap();
        });
        tokio::time::timeout(
            Duration::from_secs(10),
            event_loop(&mut screen, &mut input, &mut output, size, frame),
        )
        .await
        .unwrap()
        .unwrap();
        feeder.await.unwrap();

        assert_eq!(screen.windows()[0].lines().len(), 3);
        assert_eq!(screen.windows()[1].lines()[0].as_str(), "oops");
        assert_eq!(screen.focus(), Some(1));
        assert!(!output.is_empty());

        screen.close().await;
        assert_eq!(registry.drain().closed, 2);
        let report = supervisor.shutdown().await;
        assert!(report.killed.is_empty());
    }
}
