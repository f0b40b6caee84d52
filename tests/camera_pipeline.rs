use std::io::{BufRead, BufReader, Cursor, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use axis_mjpeg::{CameraConfig, CameraDevice, CameraPipeline, DirectorySink, LinkState, LogSink};

fn jpeg(fill: u8, len: usize) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    out.extend(std::iter::repeat(fill).take(len));
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

fn multipart(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut body = Vec::new();
    for frame in frames {
        body.extend_from_slice(b"--myboundary\r\nContent-Type: image/jpeg\r\n");
        body.extend_from_slice(format!("Content-Length: {}\r\n\r\n", frame.len()).as_bytes());
        body.extend_from_slice(frame);
        body.extend_from_slice(b"\r\n");
    }
    body
}

fn read_request(stream: &TcpStream) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => return,
            Ok(_) if line == "\r\n" => return,
            Ok(_) => {}
            Err(_) => return,
        }
    }
}

/// Serve a single HTTP request on a loopback port.
fn serve_once(status: &'static str, body: Vec<u8>, piece: usize) -> (u16, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_request(&stream);
        let header = format!(
            "HTTP/1.1 {}\r\nContent-Type: multipart/x-mixed-replace; boundary=myboundary\r\nConnection: close\r\n\r\n",
            status
        );
        stream.write_all(header.as_bytes()).unwrap();
        for part in body.chunks(piece.max(1)) {
            if stream.write_all(part).is_err() {
                return;
            }
            stream.flush().ok();
            thread::sleep(Duration::from_millis(1));
        }
    });
    (port, handle)
}

fn config_for(port: u16) -> CameraConfig {
    let mut config = CameraConfig::default();
    config.set_host(&format!("127.0.0.1:{}", port)).unwrap();
    config.queue.capacity = 16;
    config.camera.read_timeout = Duration::from_secs(5);
    config
}

#[test]
fn http_stream_frames_arrive_intact() {
    let frames = vec![jpeg(0x11, 300), jpeg(0x22, 1_000), jpeg(0x33, 17)];
    let (port, server) = serve_once("200 OK", multipart(&frames), 97);

    let mut device = CameraDevice::connect(&config_for(port)).unwrap();
    assert!(device.source().ends_with("/axis-cgi/mjpg/video.cgi"));
    assert_eq!(device.wait_for_end().unwrap(), LinkState::Ended);
    server.join().unwrap();

    let mut received = Vec::new();
    while let Ok(frame) = device.dequeue() {
        received.push(frame.into_bytes());
    }
    assert_eq!(received, frames);
    let stats = device.producer_stats().unwrap();
    assert_eq!(stats.frames_queued, 3);
    assert_eq!(stats.frames_dropped, 0);
}

#[test]
fn http_error_status_is_unavailable() {
    let (port, server) = serve_once("404 Not Found", Vec::new(), 1);

    let mut device = CameraDevice::connect(&config_for(port)).unwrap();
    let state = device.wait_for_end().unwrap();
    server.join().unwrap();

    assert!(matches!(state, LinkState::Unavailable(_)), "got {:?}", state);
    assert!(!device.frames_waiting());
}

#[test]
fn refused_connection_is_unavailable() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut device = CameraDevice::connect(&config_for(port)).unwrap();
    let state = device.wait_for_end().unwrap();
    assert!(matches!(state, LinkState::Unavailable(_)), "got {:?}", state);
}

#[test]
fn replayed_stream_is_written_to_directory() {
    let dir = tempfile::tempdir().unwrap();
    let frames = vec![jpeg(0xA0, 64), jpeg(0xB0, 64)];
    let mut config = CameraConfig::default();
    config.queue.capacity = 8;
    config.camera.chunk_size = 5;

    let device = CameraDevice::from_reader(Cursor::new(multipart(&frames)), &config).unwrap();
    let sink = DirectorySink::create(dir.path(), &config.format).unwrap();
    let mut pipeline =
        CameraPipeline::start(device, sink, config.format.clone(), Duration::from_millis(10)).unwrap();

    assert_eq!(pipeline.wait_for_end().unwrap(), LinkState::Ended);
    let deadline = Instant::now() + Duration::from_secs(5);
    while pipeline.consumer_stats().published < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    let report = pipeline.shutdown().unwrap();
    assert_eq!(report.consumer.published, 2);

    assert_eq!(std::fs::read(dir.path().join("frame_00000000.jpg")).unwrap(), frames[0]);
    assert_eq!(std::fs::read(dir.path().join("frame_00000001.jpg")).unwrap(), frames[1]);
    assert!(dir.path().join("format.json").exists());
}

#[test]
fn shutdown_discards_frames_left_in_queue() {
    let frames: Vec<Vec<u8>> = (0..6).map(|i| jpeg(i as u8, 8)).collect();
    let mut config = CameraConfig::default();
    config.queue.capacity = 4;

    let mut device = CameraDevice::from_reader(Cursor::new(multipart(&frames)), &config).unwrap();
    assert_eq!(device.wait_for_end().unwrap(), LinkState::Ended);
    let stats = device.producer_stats().unwrap();
    assert_eq!(stats.frames_queued, 4);
    assert_eq!(stats.frames_dropped, 2);

    // The consumer starts after the queue filled; shutting down right away
    // must leave nothing queued whatever it managed to publish.
    let pipeline = CameraPipeline::start(
        device,
        LogSink::new(1),
        config.format.clone(),
        Duration::from_millis(10),
    )
    .unwrap();
    let report = pipeline.shutdown().unwrap();
    assert_eq!(report.link, LinkState::Ended);
    assert_eq!(report.consumer.published as usize + report.discarded, 4);
    assert_eq!(report.queue.len, 0);
}
