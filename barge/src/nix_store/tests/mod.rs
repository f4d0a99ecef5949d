use super::*;

use crate::error::BargeError;

fn assert_parse(base_name: &str, prefix: &str, name: &str) {
    let parsed = StorePath::parse(base_name).unwrap();
    assert_eq!(prefix, parsed.prefix());
    assert_eq!(name, parsed.name());

    // The textual form must round-trip exactly.
    assert_eq!(base_name, parsed.to_string());
    assert_eq!(parsed, StorePath::parse(&parsed.to_string()).unwrap());
}

fn assert_parse_err(base_name: &str) {
    let e = StorePath::parse(base_name).unwrap_err();

    if let BargeError::BadStorePath { text, .. } = e {
        assert_eq!(base_name, text);
    } else {
        panic!("parse didn't return a BadStorePath: {:?}", e);
    }
}

#[test]
fn test_parse() {
    assert_parse(
        "abcdefghijklmnopqrstuvwxyz012345-hello-2.10",
        "abcdefghijklmnopqrstuvwxyz012345",
        "hello-2.10",
    );
    assert_parse(
        "ia70ss13m22znbl8khrf2hq72qmh5drr-ruby-2.7.5",
        "ia70ss13m22znbl8khrf2hq72qmh5drr",
        "ruby-2.7.5",
    );
    // Unusual but valid names.
    assert_parse(
        "IA70SS13M22ZNBL8KHRF2HQ72QMH5DRR-x",
        "IA70SS13M22ZNBL8KHRF2HQ72QMH5DRR",
        "x",
    );
}

#[test]
fn test_parse_errors() {
    // Prefix too short.
    assert_parse_err("tooshort-name");
    // Prefix too long (33 characters before the dash).
    assert_parse_err("ia70ss13m22znbl8khrf2hq72qmh5drrr-name");
    // Empty name.
    assert_parse_err("ia70ss13m22znbl8khrf2hq72qmh5drr-");
    // No separator.
    assert_parse_err("ia70ss13m22znbl8khrf2hq72qmh5drrname");
    // Non-alphanumeric prefix.
    assert_parse_err("ia70ss13m22znbl8khrf2hq72qmh5dr_-name");
    // Name crossing a directory boundary.
    assert_parse_err("ia70ss13m22znbl8khrf2hq72qmh5drr-a/b");
    assert_parse_err("");
}

#[test]
fn test_parse_full() {
    let full = FullStorePath::parse(Path::new(
        "/nix/store/abcdefghijklmnopqrstuvwxyz012345-hello",
    ))
    .unwrap();

    assert_eq!(Path::new("/nix/store"), full.store_dir());
    assert_eq!(
        "abcdefghijklmnopqrstuvwxyz012345-hello",
        full.path().to_string()
    );
    assert_eq!(
        "/nix/store/abcdefghijklmnopqrstuvwxyz012345-hello",
        full.to_string()
    );
    assert_eq!(
        PathBuf::from("/nix/store/abcdefghijklmnopqrstuvwxyz012345-hello"),
        full.to_path_buf()
    );
}

#[test]
fn test_parse_full_errors() {
    assert!(matches!(
        FullStorePath::parse(Path::new("/")),
        Err(BargeError::EmptyBasename { .. })
    ));

    assert!(matches!(
        FullStorePath::parse(Path::new(
            "store/abcdefghijklmnopqrstuvwxyz012345-hello"
        )),
        Err(BargeError::NotAbsolute { .. })
    ));

    assert!(matches!(
        FullStorePath::parse(Path::new("/nix/store/not-a-store-path")),
        Err(BargeError::BadStorePath { .. })
    ));
}

#[test]
fn test_parse_permissive() {
    let a = StorePath::parse_permissive("abcdefghijklmnopqrstuvwxyz012345-hello").unwrap();
    let b = StorePath::parse_permissive("/nix/store/abcdefghijklmnopqrstuvwxyz012345-hello")
        .unwrap();
    assert_eq!(a, b);

    // Both failure modes are reported.
    match StorePath::parse_permissive("hello") {
        Err(BargeError::BadStorePathAnyForm {
            text,
            as_base_name,
            as_full_path,
        }) => {
            assert_eq!("hello", text);
            assert!(!as_base_name.is_empty());
            assert!(!as_full_path.is_empty());
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_abbreviate() {
    let path = StorePath::parse("ia70ss13m22znbl8khrf2hq72qmh5drr-ruby-2.7.5").unwrap();
    assert_eq!("ia70ss-ruby-2.7.5", path.abbreviate());
}

#[test]
fn test_ordering() {
    let a = StorePath::parse("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-z").unwrap();
    let b = StorePath::parse("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb-a").unwrap();
    let c = StorePath::parse("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb-b").unwrap();

    // Lexicographic on (prefix, name).
    assert!(a < b);
    assert!(b < c);
}

#[test]
fn test_store_parse_store_path() {
    let store = NixStore::new(PathBuf::from("/nix/store")).unwrap();

    let from_base = store
        .parse_store_path("abcdefghijklmnopqrstuvwxyz012345-hello")
        .unwrap();
    let from_full = store
        .parse_store_path("/nix/store/abcdefghijklmnopqrstuvwxyz012345-hello")
        .unwrap();
    assert_eq!(from_base, from_full);

    assert_eq!(
        "/nix/store/abcdefghijklmnopqrstuvwxyz012345-hello",
        store.get_full_path(&from_base).to_string()
    );

    // A path in some other store is unusable here.
    assert!(matches!(
        store.parse_store_path("/gnu/store/abcdefghijklmnopqrstuvwxyz012345-hello"),
        Err(BargeError::BadStorePath { .. })
    ));
}

#[test]
fn test_store_dir_must_be_absolute() {
    assert!(matches!(
        NixStore::new(PathBuf::from("store")),
        Err(BargeError::NotAbsolute { .. })
    ));
}
