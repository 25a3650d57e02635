#![cfg(all(unix, feature = "libc_on_unix"))]

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::mem::ManuallyDrop;
use std::os::fd::{AsRawFd, FromRawFd};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use io_capture::{
    scoped_activate, scoped_deactivate, CaptureConfig, CaptureController, CaptureError, CaptureKind, Channel,
    Descriptor, StdDescriptors, StdStreams,
};
use rstest::rstest;

/// Writes to whatever a descriptor number currently refers to.
struct DescriptorWriter(Descriptor);

impl Write for DescriptorWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = ManuallyDrop::new(unsafe { File::from_raw_fd(self.0) });
        file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A stand-in for the process console: two files behind two descriptors, with
/// in-process streams layered on top of them.
struct Console {
    out: File,
    err: File,
    streams: StdStreams,
}

impl Console {
    fn new() -> Self {
        let out = tempfile::tempfile().unwrap();
        let err = tempfile::tempfile().unwrap();
        let streams = StdStreams::new(
            Box::new(DescriptorWriter(out.as_raw_fd())),
            Box::new(DescriptorWriter(err.as_raw_fd())),
        );
        Self { out, err, streams }
    }

    fn controller(&self, kind: CaptureKind) -> CaptureController {
        self.config(kind).build().unwrap()
    }

    /// A descriptor controller keeping its temporary files in `dir`.
    fn controller_in(&self, dir: &Path) -> CaptureController {
        CaptureConfig {
            temp_dir: Some(dir.to_path_buf()),
            ..self.config(CaptureKind::FileDescriptors)
        }
        .build()
        .unwrap()
    }

    fn config(&self, kind: CaptureKind) -> CaptureConfig {
        CaptureConfig {
            streams: Some(self.streams.clone()),
            descriptors: Some(StdDescriptors {
                out: self.out.as_raw_fd(),
                err: self.err.as_raw_fd(),
            }),
            ..CaptureConfig::with_kind(kind)
        }
    }

    /// Write through the in-process stream object.
    fn print(&self, text: &str) {
        write!(&*self.streams.out, "{text}").unwrap();
    }

    fn eprint(&self, text: &str) {
        write!(&*self.streams.err, "{text}").unwrap();
    }

    /// Write straight to the descriptor, bypassing the stream object.
    fn raw_print(&self, text: &str) {
        DescriptorWriter(self.out.as_raw_fd()).write_all(text.as_bytes()).unwrap();
    }

    fn shown_out(&mut self) -> String {
        read_all(&mut self.out)
    }

    fn shown_err(&mut self) -> String {
        read_all(&mut self.err)
    }
}

fn read_all(file: &mut File) -> String {
    let mut text = String::new();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.read_to_string(&mut text).unwrap();
    text
}

/// Delete the live temporary files out from under an active capture.
fn remove_all_files(dir: &Path) {
    for entry in std::fs::read_dir(dir).unwrap() {
        std::fs::remove_file(entry.unwrap().path()).unwrap();
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload.downcast_ref::<&str>().map(|s| s.to_string()).unwrap_or_default(),
    }
}

fn is_read_error_on_stdout(error: &CaptureError) -> bool {
    matches!(
        error,
        CaptureError::Read {
            channel: Channel::Stdout,
            ..
        }
    )
}

#[rstest]
#[case::streams(CaptureKind::Streams)]
#[case::descriptors(CaptureKind::FileDescriptors)]
fn captures_exactly_what_was_written(#[case] kind: CaptureKind) {
    let mut console = Console::new();
    let mut controller = console.controller(kind);

    controller.activate().unwrap();
    console.print("hello\n");
    console.print("");
    console.print("two\n\nlines");
    console.eprint("err\n");
    controller.deactivate().unwrap();

    assert_eq!(controller.stdout(), "hello\ntwo\n\nlines");
    assert_eq!(controller.stderr(), "err\n");
    assert_eq!(console.shown_out(), "");
    assert_eq!(console.shown_err(), "");
}

#[rstest]
#[case::streams(CaptureKind::Streams)]
#[case::descriptors(CaptureKind::FileDescriptors)]
fn clear_buffers_resets_text_only(#[case] kind: CaptureKind) {
    let console = Console::new();
    let mut controller = console.controller(kind);

    controller.activate().unwrap();
    console.print("first window");
    controller.deactivate().unwrap();
    controller.clear_buffers().unwrap();

    assert!(!controller.is_active());
    assert_eq!(controller.stdout(), "");

    controller.activate().unwrap();
    console.print("second window");
    controller.deactivate().unwrap();
    assert_eq!(controller.stdout(), "second window");
}

#[rstest]
#[case::streams(CaptureKind::Streams)]
#[case::descriptors(CaptureKind::FileDescriptors)]
fn suspension_shows_only_the_inner_window(#[case] kind: CaptureKind) {
    let mut console = Console::new();
    let mut controller = console.controller(kind);
    {
        let mut capturing = scoped_activate(&mut controller).unwrap();
        console.print("before\n");
        {
            let _shown = scoped_deactivate(&mut capturing).unwrap();
            console.print("harness log\n");
        }
        console.print("after\n");
    }

    assert_eq!(controller.stdout(), "before\nafter\n");
    assert_eq!(console.shown_out(), "harness log\n");
}

#[test]
fn only_descriptor_capture_sees_raw_writes() {
    let mut console = Console::new();

    let mut streams = console.controller(CaptureKind::Streams);
    streams.activate().unwrap();
    console.raw_print("raw under streams\n");
    streams.deactivate().unwrap();

    let mut descriptors = console.controller(CaptureKind::FileDescriptors);
    descriptors.activate().unwrap();
    console.raw_print("raw under descriptors\n");
    descriptors.deactivate().unwrap();

    assert_eq!(streams.stdout(), "");
    assert_eq!(descriptors.stdout(), "raw under descriptors\n");
    assert_eq!(console.shown_out(), "raw under streams\n");
}

#[rstest]
#[case::streams(CaptureKind::Streams)]
#[case::descriptors(CaptureKind::FileDescriptors)]
fn dropping_active_controller_restores_console(#[case] kind: CaptureKind) {
    let mut console = Console::new();
    let mut controller = console.controller(kind);

    controller.activate().unwrap();
    console.print("lost\n");
    drop(controller);
    console.print("shown\n");

    assert_eq!(console.shown_out(), "shown\n");
}

#[test]
fn failed_suspension_is_returned_to_the_caller() {
    fn run(console: &Console, dir: &Path, controller: &mut CaptureController) -> io_capture::Result<()> {
        let mut capturing = scoped_activate(controller)?;
        console.print("unread\n");
        remove_all_files(dir);
        let _shown = scoped_deactivate(&mut capturing)?;
        console.print("never reached\n");
        Ok(())
    }

    let dir = tempfile::tempdir().unwrap();
    let mut console = Console::new();
    let mut controller = console.controller_in(dir.path());

    let error = run(&console, dir.path(), &mut controller).unwrap_err();
    console.print("after\n");

    assert!(is_read_error_on_stdout(&error));
    assert!(!controller.is_active());
    assert_eq!(console.shown_out(), "after\n");
}

#[test]
fn failed_resume_panics_without_aborting() {
    let dir = tempfile::tempdir().unwrap();
    let temp_dir = dir.path().join("capture");
    std::fs::create_dir(&temp_dir).unwrap();
    let mut console = Console::new();
    let mut controller = console.controller_in(&temp_dir);

    let result = catch_unwind(AssertUnwindSafe(|| {
        let mut capturing = scoped_activate(&mut controller).unwrap();
        console.print("captured\n");
        let _shown = scoped_deactivate(&mut capturing).unwrap();
        std::fs::remove_dir(&temp_dir).unwrap();
    }));
    console.print("after\n");

    let message = panic_message(result.unwrap_err());
    assert!(message.contains("failed to create temporary file for stdout capture"), "{message}");
    assert!(!controller.is_active());
    assert_eq!(controller.stdout(), "captured\n");
    assert_eq!(console.shown_out(), "after\n");
}

#[test]
fn finish_reports_a_failed_restore() {
    let dir = tempfile::tempdir().unwrap();
    let mut console = Console::new();
    let mut controller = console.controller_in(dir.path());

    let guard = scoped_activate(&mut controller).unwrap();
    console.print("unread\n");
    remove_all_files(dir.path());
    let error = guard.finish().unwrap_err();
    console.print("after\n");

    assert!(is_read_error_on_stdout(&error));
    assert!(!controller.is_active());
    assert_eq!(console.shown_out(), "after\n");
}

#[test]
fn dropping_active_controller_panics_when_restore_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut console = Console::new();
    let mut controller = console.controller_in(dir.path());

    controller.activate().unwrap();
    remove_all_files(dir.path());
    let result = catch_unwind(AssertUnwindSafe(move || drop(controller)));
    console.print("after\n");

    let message = panic_message(result.unwrap_err());
    assert!(message.contains("failed to restore output while dropping an active capture"), "{message}");
    assert_eq!(console.shown_out(), "after\n");
}

#[test]
fn dropping_guard_panics_when_deactivate_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut console = Console::new();
    let mut controller = console.controller_in(dir.path());

    let result = catch_unwind(AssertUnwindSafe(|| {
        let _capturing = scoped_activate(&mut controller).unwrap();
        remove_all_files(dir.path());
    }));
    console.print("after\n");

    let message = panic_message(result.unwrap_err());
    assert!(message.contains("capture guard failed to restore its controller"), "{message}");
    assert!(!controller.is_active());
    assert_eq!(console.shown_out(), "after\n");
}
