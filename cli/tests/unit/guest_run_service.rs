//! End-to-end guest runs against fake tooling.

#![allow(clippy::expect_used)]

use std::future::pending;
use std::time::Duration;

use guestrun_cli::application::services::guest_run::{GuestRun, TeardownFailed};
use guestrun_cli::application::services::result_reporter::RunResult;
use guestrun_cli::domain::config::GuestConfig;
use guestrun_cli::domain::error::{MountError, RunError};
use guestrun_cli::domain::exit_status::GuestStatus;
use guestrun_cli::domain::image::{ImageFlavor, Population};
use guestrun_cli::domain::payload::GuestPayload;
use guestrun_cli::domain::vm_profile::VmProfile;

use crate::helpers::{TestBed, entries, guest_config};
use crate::mocks::{FakeEmulator, FakeFormatter, FakeHost, FakeInstaller, FakeRunner, RecordingReporter};

fn profile() -> VmProfile {
    VmProfile {
        cpus: 1,
        memory_mb: 512,
        kvm: false,
        gui: false,
        overrides: Vec::new(),
    }
}

struct Fixture {
    bed: TestBed,
    host: FakeHost,
    runner: FakeRunner,
    reporter: RecordingReporter,
    profile: VmProfile,
    guest: GuestConfig,
    population: Population,
}

impl Fixture {
    fn new() -> Self {
        Self {
            bed: TestBed::new(),
            host: FakeHost::new(),
            runner: FakeRunner::default(),
            reporter: RecordingReporter::default(),
            profile: profile(),
            guest: guest_config(),
            population: Population::Mount,
        }
    }

    async fn run(
        &self,
        emulator: &FakeEmulator,
        payload: &GuestPayload,
        interrupt: impl std::future::Future<Output = ()>,
    ) -> anyhow::Result<RunResult> {
        let catalog = self
            .bed
            .catalog(FakeInstaller::default(), FakeFormatter::backed_by(&self.host))
            .with_population(self.population);
        let mounts = self.host.controller();
        let run_root = self.bed.run_root();
        let run = GuestRun {
            catalog: &catalog,
            mounts: &mounts,
            emulator,
            runner: &self.runner,
            reporter: &self.reporter,
            profile: &self.profile,
            guest: &self.guest,
            run_root: &run_root,
        };
        run.run_guest(payload, ImageFlavor::Base, interrupt).await
    }
}

#[tokio::test]
async fn test_hello_world_exits_zero() {
    let fx = Fixture::new();
    let emulator = FakeEmulator::new(&fx.host, "hello\n", Some(0));
    let payload = fx.bed.payload("hello", &[]);

    let result = fx.run(&emulator, &payload, pending()).await.expect("run");

    assert_eq!(result.status, GuestStatus::Exited(0));
    assert_eq!(result.log, "hello\n");
    assert_eq!(
        emulator.seen_manifest.lock().expect("lock").as_deref(),
        Some("hello\n")
    );
    assert!(entries(&fx.bed.run_root()).is_empty());
    assert_eq!(fx.host.mounted_count(), 0);
    assert!(
        fx.reporter
            .lines()
            .contains(&"ok: booting guest with hello".to_string())
    );
}

#[tokio::test]
async fn test_archive_population_runs_without_mounting() {
    let mut fx = Fixture::new();
    fx.population = Population::Archive;
    fx.guest.runner = Some(fx.bed.executable("guestrund"));
    let emulator = FakeEmulator::exiting(&fx.host, "hi\n", 7);
    let payload = fx.bed.payload("hello", &["a"]);

    let result = fx.run(&emulator, &payload, pending()).await.expect("run");

    assert_eq!(result.status, GuestStatus::Exited(7));
    assert_eq!(result.log, "hi\n");
    assert_eq!(
        emulator.seen_manifest.lock().expect("lock").as_deref(),
        Some("hello\na\n")
    );
    assert_eq!(fx.host.spawned(), 0);
    assert!(fx.bed.layout().archive(ImageFlavor::Base).is_file());
    assert!(!fx.bed.layout().image(ImageFlavor::Base).exists());
    assert!(entries(&fx.bed.run_root()).is_empty());
}

#[tokio::test]
async fn test_guest_exit_code_is_recovered() {
    let fx = Fixture::new();
    let emulator = FakeEmulator::exiting(&fx.host, "", 42);
    let payload = fx.bed.payload("fail", &["--code", "42"]);

    let result = fx.run(&emulator, &payload, pending()).await.expect("run");

    assert_eq!(result.status, GuestStatus::Exited(42));
    assert_eq!(result.status.process_exit_code(), 42);
    assert_eq!(
        emulator.seen_manifest.lock().expect("lock").as_deref(),
        Some("fail\n--code\n42\n")
    );
}

#[tokio::test]
async fn test_killed_emulator_is_indeterminate() {
    let fx = Fixture::new();
    let emulator = FakeEmulator::new(&fx.host, "partial", None);
    let payload = fx.bed.payload("crash", &[]);

    let result = fx.run(&emulator, &payload, pending()).await.expect("run");

    assert_eq!(result.status, GuestStatus::Indeterminate);
    assert_eq!(result.status.process_exit_code(), 125);
    assert!(entries(&fx.bed.run_root()).is_empty());
}

#[tokio::test]
async fn test_headless_profile_reaches_emulator() {
    let fx = Fixture::new();
    let emulator = FakeEmulator::new(&fx.host, "", Some(0));
    let payload = fx.bed.payload("hello", &[]);

    fx.run(&emulator, &payload, pending()).await.expect("run");

    let args = emulator.seen_args.lock().expect("lock").clone();
    assert!(args.contains(&"-nographic".to_string()), "{args:?}");
    assert!(!args.contains(&"-accel".to_string()), "{args:?}");
    assert!(args.contains(&"isa-debug-exit".to_string()), "{args:?}");
}

#[tokio::test]
async fn test_folder_arguments_are_rewritten() {
    let fx = Fixture::new();
    let data = fx.bed.dir.path().join("data");
    std::fs::create_dir_all(data.join("nested")).expect("data dir");
    std::fs::write(data.join("input.txt"), "42").expect("input");
    std::fs::write(data.join("nested/more.txt"), "43").expect("nested");
    let canonical = std::fs::canonicalize(&data).expect("canonical");
    let arg = canonical.join("input.txt").display().to_string();

    let payload = GuestPayload::new(
        fx.bed.executable("cat"),
        vec![arg.clone(), "plain".to_string()],
        Some(data.clone()),
    )
    .expect("payload");
    let emulator = FakeEmulator::new(&fx.host, "42\n", Some(0));

    let result = fx.run(&emulator, &payload, pending()).await.expect("run");

    assert_eq!(result.log, "42\n");
    assert_eq!(
        emulator.seen_manifest.lock().expect("lock").as_deref(),
        Some("cat\n/root/input.txt\nplain\n")
    );
    let rsync = fx
        .runner
        .calls
        .lock()
        .expect("lock")
        .iter()
        .find(|c| c[0] == "rsync")
        .cloned()
        .expect("rsync invoked");
    assert_eq!(rsync[2], format!("{}/", canonical.display()));
    assert_eq!(
        *fx.runner.timeouts.lock().expect("lock"),
        vec![("rsync".to_string(), fx.guest.copy_timeout())]
    );
    assert!(
        fx.reporter
            .lines()
            .iter()
            .any(|l| l.contains(&format!("replacing '{arg}' with '/root/input.txt'")))
    );
}

#[tokio::test]
async fn test_teardown_failure_still_returns_guest_output() {
    let fx = Fixture::new();
    let mut emulator = FakeEmulator::exiting(&fx.host, "hello\n", 3);
    emulator.wedge_workspace = true;
    let payload = fx.bed.payload("hello", &[]);

    let err = fx
        .run(&emulator, &payload, pending())
        .await
        .expect_err("teardown must fail");

    let failed = err
        .downcast_ref::<TeardownFailed>()
        .expect("finished run is attached");
    assert_eq!(failed.result.log, "hello\n");
    assert_eq!(failed.result.status, GuestStatus::Exited(3));
    assert!(matches!(
        failed.teardown.downcast_ref::<MountError>(),
        Some(MountError::UnmountFailure { .. })
    ));
}

#[tokio::test]
async fn test_missing_payload_fails_and_cleans_up() {
    let fx = Fixture::new();
    let emulator = FakeEmulator::new(&fx.host, "", Some(0));
    let payload =
        GuestPayload::new(fx.bed.dir.path().join("missing"), Vec::new(), None).expect("payload");

    let err = fx
        .run(&emulator, &payload, pending())
        .await
        .expect_err("run must fail");

    assert!(matches!(
        err.downcast_ref::<RunError>(),
        Some(RunError::PayloadNotFound(_))
    ));
    assert!(emulator.seen_args.lock().expect("lock").is_empty());
    assert!(entries(&fx.bed.run_root()).is_empty());
    assert_eq!(fx.host.mounted_count(), 0);
}

#[tokio::test]
async fn test_interrupt_during_boot_tears_down() {
    let fx = Fixture::new();
    let mut emulator = FakeEmulator::new(&fx.host, "", Some(0));
    emulator.delay = Some(Duration::from_secs(30));
    let payload = fx.bed.payload("sleepy", &[]);

    let err = fx
        .run(
            &emulator,
            &payload,
            tokio::time::sleep(Duration::from_millis(500)),
        )
        .await
        .expect_err("run must be interrupted");

    assert!(matches!(
        err.downcast_ref::<RunError>(),
        Some(RunError::Interrupted)
    ));
    assert!(entries(&fx.bed.run_root()).is_empty());
    assert_eq!(fx.host.mounted_count(), 0);
    // The cached image survives an interrupted run.
    assert!(fx.bed.layout().image(ImageFlavor::Base).is_file());
}

#[tokio::test]
async fn test_second_run_reuses_cached_image() {
    let fx = Fixture::new();
    let emulator = FakeEmulator::new(&fx.host, "again\n", Some(0));
    let payload = fx.bed.payload("hello", &[]);

    fx.run(&emulator, &payload, pending()).await.expect("first");
    let spawned = fx.host.spawned();
    fx.run(&emulator, &payload, pending()).await.expect("second");

    // Only the workspace mount happens on the second run.
    assert_eq!(fx.host.spawned(), spawned + 1);
    assert!(entries(&fx.bed.run_root()).is_empty());
}
