//! Version command.

pub fn execute(json: bool) {
    let version = env!("CARGO_PKG_VERSION");
    if json {
        println!("{}", serde_json::json!({"name": "engram", "version": version}));
    } else {
        println!("engram {version}");
    }
}
