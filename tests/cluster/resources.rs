use json_server_operator::model::spec::{JsonServer, JsonServerSpec};
use kube::api::ObjectMeta;

pub static NAMESPACE: &str = "default";

pub fn json_server(name: &str, json_config: &str, replicas: Option<i32>, image: Option<&str>) -> JsonServer {
    let mut server = JsonServer::new(name, JsonServerSpec {
        replicas,
        json_config: String::from(json_config),
        image: image.map(String::from),
    });
    server.metadata = ObjectMeta {
        name: Some(String::from(name)),
        namespace: Some(String::from(NAMESPACE)),
        ..Default::default()
    };
    server
}
