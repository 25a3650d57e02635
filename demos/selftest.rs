use std::io::{stderr, stdout, Write};

use io_capture::{make_capture, scoped_activate, scoped_deactivate, CaptureController, CaptureGuard, CaptureKind};
use tracing_subscriber::EnvFilter;

/// This executable runs captures against the real process stdout and stderr.
/// Every assertion is made in-process; whatever is printed to the console is
/// checked by the integration test that launches it: text written while a
/// capture is active must not show up there, text written around or between
/// captures must.
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(stderr)
        .init();

    descriptors_capture_everything();
    streams_miss_direct_writes();
    descriptors_see_direct_writes();
    suspension_reaches_the_console();
    dropping_an_active_capture_restores();
    guard_returned_from_function_restores_once();

    println!("selftest passed");
}

fn descriptors_capture_everything() {
    // Arrange
    let mut controller = make_capture(true).unwrap();
    assert_eq!(controller.kind(), CaptureKind::FileDescriptors);

    // Act
    {
        let _guard = scoped_activate(&mut controller).unwrap();
        println!("hello");
        eprintln!("err");
    }

    // Assert
    assert_eq!(controller.stdout(), "hello\n");
    assert_eq!(controller.stderr(), "err\n");
}

fn streams_miss_direct_writes() {
    let mut controller = make_capture(false).unwrap();

    controller.activate().unwrap();
    writeln!(io_capture::stdout(), "through the stream object").unwrap();
    stdout().write_all(b"direct write under streams\n").unwrap();
    stdout().flush().unwrap();
    controller.deactivate().unwrap();

    assert_eq!(controller.stdout(), "through the stream object\n");
}

fn descriptors_see_direct_writes() {
    let mut controller = make_capture(true).unwrap();

    controller.activate().unwrap();
    writeln!(io_capture::stdout(), "through the stream object").unwrap();
    stdout().write_all(b"direct write under descriptors\n").unwrap();
    controller.deactivate().unwrap();

    assert_eq!(
        controller.stdout(),
        "through the stream object\ndirect write under descriptors\n"
    );
}

fn suspension_reaches_the_console() {
    let mut controller = make_capture(true).unwrap();
    {
        let mut capturing = scoped_activate(&mut controller).unwrap();
        println!("captured before suspension");
        {
            let _console = scoped_deactivate(&mut capturing).unwrap();
            println!("printed during suspension");
        }
        println!("captured after suspension");
    }

    assert_eq!(
        controller.stdout(),
        "captured before suspension\ncaptured after suspension\n"
    );
}

fn dropping_an_active_capture_restores() {
    let mut controller = make_capture(true).unwrap();
    controller.activate().unwrap();
    println!("swallowed by dropped capture");
    drop(controller);

    println!("printed after drop");
}

fn guard_returned_from_function_restores_once() {
    fn start(controller: &mut CaptureController) -> CaptureGuard<'_> {
        scoped_activate(controller).unwrap()
    }

    let mut controller = make_capture(true).unwrap();
    {
        let guard = start(&mut controller);
        println!("captured through moved guard");
        let moved = guard;
        assert!(moved.is_active());
    }

    assert!(!controller.is_active());
    assert_eq!(controller.stdout(), "captured through moved guard\n");
}
