use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::Value;

pub const OUTLINE_PROSE: &str = "Characters: Ada, a glassblower.\n\
Setting: a city of glass.\n\
Chapter 1: Glass\n\
The city shatters and Ada flees.\n\
Chapter 2: Ash\n\
Ada rebuilds from the ruins.\n";

/// Answers the OpenAI Responses API and the Ollama chat/tags API with canned
/// story text, recording every prompt it sees.
pub struct BackendStub {
    pub root_url: String,
    pub prompts: Arc<Mutex<Vec<(String, String)>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl BackendStub {
    pub fn spawn(local_models: &[&str]) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start backend stub server");
        let root_url = format!("http://{}", server.server_addr());
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let tags = serde_json::json!({
            "models": local_models
                .iter()
                .map(|name| serde_json::json!({ "model": name }))
                .collect::<Vec<_>>(),
        })
        .to_string();

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let recorded = Arc::clone(&prompts);
        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                if request.method() == &tiny_http::Method::Get && path == "/api/tags" {
                    let _ = request.respond(json_response(tags.clone()));
                    continue;
                }

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }
                let parsed: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(_) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("invalid json").with_status_code(400),
                        );
                        continue;
                    }
                };

                let prompt = match path.as_str() {
                    "/v1/responses" => parsed.get("input").and_then(|v| v.as_str()),
                    "/api/chat" => parsed.pointer("/messages/0/content").and_then(|v| v.as_str()),
                    _ => None,
                };
                let Some(prompt) = prompt else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                };
                recorded
                    .lock()
                    .expect("lock prompts")
                    .push((path.clone(), prompt.to_owned()));

                let text = reply_for(prompt);
                let response_body = if path == "/api/chat" {
                    serde_json::json!({
                        "model": parsed.get("model").cloned().unwrap_or(Value::Null),
                        "message": { "role": "assistant", "content": text },
                        "done": true
                    })
                } else {
                    serde_json::json!({
                        "id": "resp_stub",
                        "object": "response",
                        "output": [
                            {
                                "type": "message",
                                "role": "assistant",
                                "content": [ { "type": "output_text", "text": text } ]
                            }
                        ]
                    })
                };
                let _ = request.respond(json_response(response_body.to_string()));
            }
        });

        Self {
            root_url,
            prompts,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn openai_base_url(&self) -> String {
        format!("{}/v1", self.root_url)
    }

    pub fn prompts_for(&self, path: &str) -> Vec<String> {
        self.prompts
            .lock()
            .expect("lock prompts")
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }
}

impl Drop for BackendStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn json_response(body: String) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let header = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("build header");
    tiny_http::Response::from_string(body)
        .with_status_code(200)
        .with_header(header)
}

fn reply_for(prompt: &str) -> String {
    if prompt.contains("into valid JSON") {
        // Fenced, chatty and with a trailing comma, the way models answer.
        return "Sure!\n```json\n{\n  \"chapters\": [\n    {\"title\": \"Glass\", \
\"summary\": \"The city shatters and Ada flees.\"},\n    {\"title\": \"Ash\", \
\"summary\": \"Ada rebuilds from the ruins.\"},\n  ]\n}\n```\n"
            .to_owned();
    }
    if prompt.contains("story architect") {
        return OUTLINE_PROSE.to_owned();
    }
    let words = (0..320).map(|i| format!("glass{i}")).collect::<Vec<_>>();
    format!("Page 1 Draft: {}", words.join(" "))
}
