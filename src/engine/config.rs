use super::{ConnectOptions, Engine};

pub fn parse_engine(s: &str) -> Option<Engine> {
    match s.to_lowercase().as_str() {
        "pilosa" => Some(Engine::Pilosa),
        #[cfg(any(test, feature = "engine-mock"))]
        "mock" => Some(Engine::Mock),
        _ => None,
    }
}

pub fn parse_connect_kv(pairs: &[String]) -> ConnectOptions {
    let mut opts = ConnectOptions::default();
    for p in pairs {
        if let Some((k, v)) = p.split_once('=') {
            opts.params.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    opts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engines_are_case_insensitive() {
        assert_eq!(parse_engine("Pilosa"), Some(Engine::Pilosa));
        assert_eq!(parse_engine("MOCK"), Some(Engine::Mock));
        assert_eq!(parse_engine("zenoh"), None);
    }

    #[test]
    fn connect_pairs_skip_malformed_entries() {
        let opts = parse_connect_kv(&[
            "host=localhost:10101".to_string(),
            "index = ssb".to_string(),
            "garbage".to_string(),
        ]);
        assert_eq!(opts.get("host"), Some("localhost:10101"));
        assert_eq!(opts.get("index"), Some("ssb"));
        assert_eq!(opts.params.len(), 2);
    }
}
