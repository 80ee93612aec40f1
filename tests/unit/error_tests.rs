use remote_browser::AppError;

#[test]
fn display_prefixes_each_variant() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Spawn("bad".into()), "spawn: bad"),
        (AppError::Bind("bad".into()), "bind: bad"),
        (AppError::Credential("bad".into()), "credential: bad"),
        (AppError::Gateway("bad".into()), "gateway: bad"),
        (AppError::Io("bad".into()), "io: bad"),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("missing")));
}

#[test]
fn toml_errors_convert_to_config() {
    let toml_err = toml::from_str::<toml::Value>("= nope").unwrap_err();
    let err: AppError = toml_err.into();
    assert!(err.to_string().starts_with("config: invalid config"));
}
