use std::path::Path;

use remote_browser::services::remote_access::{persist_credential, server_spec};
use remote_browser::services::web_viewer::bridge_spec;

#[test]
fn open_mode_uses_nopw() {
    let spec = server_spec("x11vnc", ":99", 5900, None);

    assert_eq!(spec.program, "x11vnc");
    assert_eq!(
        spec.args,
        vec!["-display", ":99", "-forever", "-shared", "-rfbport", "5900", "-nopw"]
    );
}

#[test]
fn authenticated_mode_uses_password_file() {
    let spec = server_spec("x11vnc", ":1", 5901, Some(Path::new("/root/.vnc/passwd")));

    assert!(spec.args.contains(&"-shared".to_owned()));
    assert!(spec.args.contains(&"-forever".to_owned()));
    assert!(!spec.args.contains(&"-nopw".to_owned()));
    assert_eq!(
        &spec.args[spec.args.len() - 2..],
        ["-rfbauth", "/root/.vnc/passwd"]
    );
}

#[test]
fn web_viewer_bridges_to_vnc_port() {
    let spec = bridge_spec("websockify", Path::new("/usr/share/novnc"), 6080, 5900);

    assert_eq!(spec.program, "websockify");
    assert_eq!(
        spec.args,
        vec!["--web", "/usr/share/novnc", "6080", "localhost:5900"]
    );
}

#[cfg(unix)]
mod credential_storage {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use remote_browser::AppError;

    use super::persist_credential;

    fn write_script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");
        path.display().to_string()
    }

    fn mode(path: &Path) -> u32 {
        std::fs::metadata(path).expect("metadata").permissions().mode() & 0o777
    }

    #[tokio::test]
    async fn stores_secret_with_owner_only_permissions() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tool = write_script(temp.path(), "storepasswd", r#"printf 'hashed-%s' "$2" > "$3""#);
        let target = temp.path().join("vnc").join("passwd");

        persist_credential(&tool, "viewer", &target)
            .await
            .expect("credential stored");

        let stored = std::fs::read_to_string(&target).expect("read credential");
        assert_eq!(stored, "hashed-viewer");
        assert_eq!(mode(&target), 0o600);
        assert_eq!(mode(target.parent().expect("parent")), 0o700);
    }

    #[tokio::test]
    async fn failing_tool_is_a_credential_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tool = write_script(temp.path(), "broken", "echo nope >&2; exit 3");
        let target = temp.path().join("passwd");

        let err = persist_credential(&tool, "viewer", &target)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Credential(ref msg) if msg.contains("nope")));
    }

    #[tokio::test]
    async fn missing_tool_is_a_credential_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = persist_credential(
            "/nonexistent/remote-access-tool",
            "viewer",
            &temp.path().join("passwd"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Credential(_)));
    }
}
