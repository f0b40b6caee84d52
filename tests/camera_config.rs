use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use axis_mjpeg::config::CameraConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "AXIS_CONFIG",
        "AXIS_CAMERA_HOST",
        "AXIS_QUEUE_CAPACITY",
        "AXIS_READ_TIMEOUT_MS",
        "AXIS_PTZ_SPEED",
        "AXIS_PTZ_WORKERS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let cfg = CameraConfig::load().expect("load config");
    assert_eq!(cfg.camera.host, "http://192.168.0.90");
    assert_eq!(cfg.queue.capacity, 5);
    assert_eq!(cfg.scanner.max_frame_bytes, 5 * 1024 * 1024);
    assert_eq!(cfg.format.width, 768);
    assert_eq!(cfg.format.height, 576);
    assert_eq!(cfg.format.bits_per_pixel, 24);
    assert_eq!(cfg.consumer.poll_interval, Duration::from_millis(100));
    assert_eq!(cfg.ptz.default_speed, 90);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let file = write_config(
        r#"{
            "camera": {
                "host": "http://10.1.2.3:8080",
                "read_timeout_ms": 2500,
                "chunk_size": 4096
            },
            "queue": { "capacity": 10 },
            "format": { "width": 640, "height": 480 },
            "consumer": { "poll_interval_ms": 40 },
            "ptz": { "default_speed": 50, "workers": 3 }
        }"#,
    );

    std::env::set_var("AXIS_CONFIG", file.path());
    std::env::set_var("AXIS_QUEUE_CAPACITY", "3");
    std::env::set_var("AXIS_PTZ_SPEED", "75");

    let cfg = CameraConfig::load().expect("load config");
    clear_env();

    assert_eq!(cfg.camera.host, "http://10.1.2.3:8080");
    assert_eq!(cfg.camera.read_timeout, Duration::from_millis(2500));
    assert_eq!(cfg.camera.chunk_size, 4096);
    assert_eq!(cfg.queue.capacity, 3);
    assert_eq!(cfg.format.width, 640);
    assert_eq!(cfg.format.height, 480);
    assert_eq!(cfg.consumer.poll_interval, Duration::from_millis(40));
    assert_eq!(cfg.ptz.default_speed, 75);
    assert_eq!(cfg.ptz.workers, 3);
    assert_eq!(
        cfg.stream_url().unwrap(),
        "http://10.1.2.3:8080/axis-cgi/mjpg/video.cgi"
    );
    assert_eq!(
        cfg.ptz_url().unwrap(),
        "http://10.1.2.3:8080/axis-cgi/com/ptz.cgi"
    );
}

#[test]
fn env_host_overrides_file() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let file = write_config(r#"{ "camera": { "host": "http://10.0.0.1" } }"#);
    std::env::set_var("AXIS_CONFIG", file.path());
    std::env::set_var("AXIS_CAMERA_HOST", "camera.local");

    let cfg = CameraConfig::load().expect("load config");
    clear_env();

    assert_eq!(cfg.camera.host, "http://camera.local");
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    std::env::set_var("AXIS_QUEUE_CAPACITY", "0");
    assert!(CameraConfig::load().is_err());
    clear_env();

    std::env::set_var("AXIS_QUEUE_CAPACITY", "five");
    assert!(CameraConfig::load().is_err());
    clear_env();

    std::env::set_var("AXIS_PTZ_SPEED", "150");
    assert!(CameraConfig::load().is_err());
    clear_env();

    std::env::set_var("AXIS_CAMERA_HOST", "ftp://camera");
    assert!(CameraConfig::load().is_err());
    clear_env();

    let file = write_config(r#"{ "scanner": { "max_frame_bytes": 0 } }"#);
    std::env::set_var("AXIS_CONFIG", file.path());
    assert!(CameraConfig::load().is_err());
    clear_env();

    let file = write_config(r#"{ "consumer": { "poll_interval_ms": 0 } }"#);
    std::env::set_var("AXIS_CONFIG", file.path());
    assert!(CameraConfig::load().is_err());
    clear_env();
}

#[test]
fn malformed_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let file = write_config("{ not json");
    std::env::set_var("AXIS_CONFIG", file.path());
    let err = CameraConfig::load().unwrap_err();
    clear_env();

    assert!(err.to_string().contains("invalid config file"));
}
