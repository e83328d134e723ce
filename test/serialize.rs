use std::convert::TryFrom;

use logoot::*;

#[test]
fn test_empty_sequence_wire_shape() {
    let seq: Sequence<u32, String> = Sequence::new();
    assert_eq!(
        serde_json::to_string(&seq).unwrap(),
        "[[[[[0,0]],0],null],[[[[32767,0]],1],null]]"
    );
}

#[test]
fn test_sequence_roundtrip() {
    let mut site = Site::new(4u32).unwrap();
    let mut seq = Sequence::new();
    for (i, word) in ["to", "be", "or"].iter().enumerate() {
        seq.insert_index(&mut site, i, word.to_string()).unwrap();
    }

    let json = serde_json::to_string(&seq).unwrap();
    let decoded: Sequence<u32, String> = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, seq);
}

#[test]
fn test_string_site_roundtrip() {
    let mut site = Site::new("replica-a".to_string()).unwrap();
    let mut seq = Sequence::new();
    seq.insert_index(&mut site, 0, 1u8).unwrap();

    let json = serde_json::to_string(&seq).unwrap();
    let decoded: Sequence<String, u8> = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, seq);
    assert!(json.starts_with(r#"[[[[[0,""]],0],null]"#));
}

#[test]
fn test_op_roundtrip() {
    let atom = Atom::new(AtomIdent::new(Position::from(vec![(12u16, 7u32)]), 3), 'q');
    let op = Op::Insert { atom };

    let json = serde_json::to_string(&op).unwrap();
    assert_eq!(json, r#"{"op":"Insert","atom":[[[[12,7]],3],"q"]}"#);
    assert_eq!(serde_json::from_str::<Op<u32, char>>(&json).unwrap(), op);

    let op: Op<u32, char> = Op::Delete {
        id: AtomIdent::new(Position::from(vec![(12, 7)]), 3),
    };
    let json = serde_json::to_string(&op).unwrap();
    assert_eq!(serde_json::from_str::<Op<u32, char>>(&json).unwrap(), op);
}

#[test]
fn test_malformed_sequence_rejected() {
    // sentinels swapped
    let json = "[[[[[32767,0]],1],null],[[[[0,0]],0],null]]";
    assert!(serde_json::from_str::<Sequence<u32, char>>(json).is_err());

    // missing MAX sentinel
    let json = r#"[[[[[0,0]],0],null],[[[[5,1]],1],"a"]]]"#;
    assert!(serde_json::from_str::<Sequence<u32, char>>(json).is_err());
}

#[test]
fn test_position_closed_below_rejected() {
    // "b" sits at "a" padded with a sentinel digit, nothing could ever go between them
    let json = r#"[[[[[0,0]],0],null],[[[[5,1]],1],"a"],[[[[5,1],[0,0]],2],"b"],[[[[32767,0]],1],null]]"#;
    assert!(serde_json::from_str::<Sequence<u32, char>>(json).is_err());
}

#[test]
fn test_digit_out_of_range_rejected() {
    assert!(serde_json::from_str::<Identifier<u32>>("[32768,1]").is_err());
    assert_eq!(
        serde_json::from_str::<Identifier<u32>>("[32767,1]").unwrap(),
        Identifier::new(MAX_POS, 1)
    );
}

#[test]
fn test_atoms_into_and_back() {
    let mut site = Site::new(9u32).unwrap();
    let mut seq = Sequence::new();
    seq.insert_index(&mut site, 0, 'z').unwrap();

    let atoms: Vec<Atom<u32, char>> = seq.clone().into();
    assert_eq!(Sequence::try_from(atoms), Ok(seq));
}
