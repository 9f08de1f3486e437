//! Shared fixtures for the integration suites

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;

/// XML property list with string values for the given keys
pub fn info_plist(keys: &[(&str, &str)]) -> Vec<u8> {
    let mut dict = plist::Dictionary::new();
    for (k, v) in keys {
        dict.insert(k.to_string(), plist::Value::String(v.to_string()));
    }
    let mut out = Vec::new();
    plist::Value::Dictionary(dict)
        .to_writer_xml(&mut out)
        .unwrap();
    out
}

/// Manifest that satisfies every manifest rule
pub fn standard_manifest() -> Vec<u8> {
    info_plist(&[
        ("CFBundleIdentifier", "com.example.app"),
        ("CFBundleShortVersionString", "1.2.3"),
        ("CFBundleVersion", "42"),
        ("MinimumOSVersion", "13.0"),
        ("CFBundleDisplayName", "Example"),
    ])
}

/// Zip archive bytes with the given entries
pub fn ipa_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, bytes) in entries {
        writer.start_file(name.to_string(), options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Package bytes that satisfy every store structural rule
pub fn valid_ipa_bytes() -> Vec<u8> {
    let manifest = standard_manifest();
    ipa_bytes(&[
        ("Payload/Runner.app/Info.plist", manifest.as_slice()),
        ("Payload/Runner.app/AppIcon60x60@2x.png", b"png"),
        ("Payload/Runner.app/_CodeSignature/CodeResources", b"sig"),
        ("Payload/Runner.app/embedded.mobileprovision", b"profile"),
        ("Payload/Runner.app/Runner", b"binary"),
    ])
}
