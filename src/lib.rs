/*
Threads
    main loop (single owner of Screen, every Window's scroll state and drained lines)
        poll stdin, apply commands
        Window::update on every window, render if dirty
        sleep one frame
    one reader task per source
        waits on its stream, stages lines behind the LineStore's staging lock
        registers the stream it opened with the ResourceRegistry

Teardown order matters
    restore terminal
    abort + join readers (nothing may touch a stream after this)
    drain ResourceRegistry (closes the streams)
    SIGTERM children, poll, SIGKILL leftovers
*/
pub mod app;
pub mod config;
pub mod input;
pub mod layout;
pub mod line_store;
pub mod logging;
pub mod reader;
pub mod resources;
pub mod screen;
pub mod supervisor;
pub mod terminal;
pub mod text;
pub mod window;

pub use app::run;
pub use config::{Cli, Config};
pub use screen::Screen;
pub use window::Window;
