use dso::writer::DsoBuilder;
use dso::{Error, FileData};

#[test]
fn round_trip_tables_and_fixups() {
    let mut b = DsoBuilder::new(44);
    let s_foo = b.add_string("foo");
    let s_bar = b.add_string("bar");
    let f_pi = b.add_float(3.25);

    b.emit(7);
    b.emit_ident(s_bar);
    b.emit(f_pi);

    let image = b.build();
    let file = FileData::parse(&image, Some(44)).expect("parse failed");

    assert_eq!(file.version(), 44);
    assert_eq!(file.code_size(), 3);
    assert_eq!(file.op(0), Some(7));
    assert_eq!(file.op(3), None);
    assert_eq!(file.string_table(s_foo).unwrap(), "foo");
    assert_eq!(file.float_table(f_pi).unwrap(), 3.25);

    // The fixup patched code word 1 with bar's string offset.
    assert_eq!(file.op(1), Some(s_bar));
    assert_eq!(file.identifier(1, 0).as_deref(), Some("bar"));
}

#[test]
fn version_mismatch_is_rejected() {
    let b = DsoBuilder::new(33);
    let image = b.build();
    match FileData::parse(&image, Some(44)) {
        Err(Error::VersionMismatch { expected, found }) => {
            assert_eq!((expected, found), (44, 33));
        }
        other => panic!("expected VersionMismatch, got {other:?}"),
    }
    // Without an expected version anything goes.
    assert_eq!(FileData::parse(&image, None).unwrap().version(), 33);
}

#[test]
fn truncated_image_is_rejected() {
    let mut b = DsoBuilder::new(44);
    b.emit(1);
    b.emit(2);
    let image = b.build();
    // Chop off the last code word and the (empty) fixup table.
    let truncated = &image[..image.len() - 8];
    assert!(matches!(
        FileData::parse(truncated, None),
        Err(Error::UnexpectedEof { .. })
    ));
}

#[test]
fn fixup_outside_code_is_rejected() {
    let mut b = DsoBuilder::new(44);
    let s = b.add_string("x");
    b.emit_ident(s);
    let mut image = b.build();
    // The single fixup offset is the last u32 of the image; point it past
    // the end of the one-word code segment.
    let len = image.len();
    image[len - 4..].copy_from_slice(&9u32.to_le_bytes());
    assert!(matches!(
        FileData::parse(&image, None),
        Err(Error::FixupOutOfRange { .. })
    ));
}
