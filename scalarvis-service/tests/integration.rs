use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn wait_for_service(base_url: &str, timeout: Duration) -> bool {
    let client = reqwest::blocking::Client::new();
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if client.get(format!("{base_url}/metrics")).send().is_ok() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    false
}

fn write_training_log(dir: &std::path::Path) {
    std::fs::write(
        dir.join("worker_0.log"),
        "2024-01-01 00:00:00,000 step: [0/1] loss: 1.0\n\
         2024-01-01 00:00:01,000 step: [1/1] loss: 0.5\n",
    )
    .unwrap();
}

#[test]
fn test_service_lifecycle() {
    let dir = TempDir::new().unwrap();
    write_training_log(dir.path());

    let port = free_port();
    let base_url = format!("http://127.0.0.1:{port}");

    let mut service = Command::new(env!("CARGO_BIN_EXE_scalarvis-service"))
        .args(["--port", &port.to_string()])
        .spawn()
        .expect("failed to start scalarvis-service");

    assert!(
        wait_for_service(&base_url, Duration::from_secs(5)),
        "service failed to start"
    );

    let client = reqwest::blocking::Client::new();

    // 1. Import the directory.
    let resp: serde_json::Value = client
        .post(format!("{base_url}/importFile"))
        .json(&serde_json::json!({
            "append": false,
            "pathList": [dir.path().to_string_lossy()],
        }))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert!(resp["result"].as_bool().unwrap());
    let project_name = resp["body"]["projectName"].as_str().unwrap().to_string();

    // 2. Poll until parsing finishes.
    let mut finished = false;
    for _ in 0..50 {
        let resp: serde_json::Value = client
            .post(format!("{base_url}/getParseState"))
            .json(&serde_json::json!({ "projectNameLists": [&project_name] }))
            .send()
            .unwrap()
            .json()
            .unwrap();
        if resp["body"]["stateList"][0]["finish"].as_bool() == Some(true) {
            finished = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(finished, "import never finished parsing");

    // 3. The Loss tag should now be discoverable.
    let resp: serde_json::Value = client.get(format!("{base_url}/getAllGraph")).send().unwrap().json().unwrap();
    let tags = resp["body"]["data"].as_array().unwrap();
    assert!(tags.iter().any(|t| t["tag"].as_str() == Some("Loss")));
    let file_path = tags
        .iter()
        .find(|t| t["tag"].as_str() == Some("Loss"))
        .unwrap()["fileList"][0]["path"]
        .as_str()
        .unwrap()
        .to_string();

    // 4. Query the series back.
    let resp: serde_json::Value = client
        .post(format!("{base_url}/getScalarData"))
        .json(&serde_json::json!({
            "graphList": [{
                "tag": "Loss",
                "file": file_path,
                "start": 0,
                "end": 100,
                "graphConfig": [],
            }],
        }))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert!(resp["result"].as_bool().unwrap());
    let normal = resp["body"]["data"][0]["normal"].as_object().unwrap();
    assert_eq!(normal.len(), 2);

    // 5. Unknown merge action is rejected with the JSON envelope, not a
    // bare HTTP error body.
    let resp = client
        .post(format!("{base_url}/fileMerge"))
        .json(&serde_json::json!({ "action": "bogus", "name": "x", "fileList": [] }))
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().unwrap();
    assert!(!body["result"].as_bool().unwrap());

    service.kill().ok();
}
