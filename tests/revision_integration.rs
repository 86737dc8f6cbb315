//! Revision-chain behavior across the model: patch layering, historical
//! reconstruction, block revision isolation, and remote image degradation.

use std::io::Write;
use std::sync::Arc;

use patina::{
    AddressContainer, BlockTree, ByteContainer, Image, Map, MapPerms, ModelError, StructuredContext,
    StructuredForm,
};

#[test]
fn patch_order_and_historical_reconstruction() {
    let image = Arc::new(Image::from_bytes(vec![0u8; 8]));
    let mut ac = AddressContainer::new(ByteContainer::spanning(image, 0, None));

    ac.add_revision();
    ac.patch_bytes(0, &[1, 1, 1, 1]).unwrap();
    ac.add_revision();
    ac.patch_bytes(2, &[2, 2]).unwrap();
    ac.add_revision();
    ac.patch_bytes(3, &[3]).unwrap();

    assert_eq!(ac.image_at(0).unwrap(), vec![0u8; 8]);
    assert_eq!(ac.image_at(1).unwrap(), vec![1, 1, 1, 1, 0, 0, 0, 0]);
    assert_eq!(ac.image_at(2).unwrap(), vec![1, 1, 2, 2, 0, 0, 0, 0]);
    assert_eq!(ac.image_at(3).unwrap(), vec![1, 1, 2, 3, 0, 0, 0, 0]);
    // Replaying twice yields identical bytes.
    assert_eq!(ac.image_at(3).unwrap(), ac.image().unwrap());

    assert!(matches!(
        ac.image_at(4),
        Err(ModelError::InvalidRevision { .. })
    ));
}

#[test]
fn only_topmost_revision_is_removable() {
    let image = Arc::new(Image::from_bytes(vec![0u8; 8]));
    let mut ac = AddressContainer::new(ByteContainer::spanning(image, 0, None));
    ac.add_revision();
    ac.add_revision();

    assert!(matches!(
        ac.remove_revision(1),
        Err(ModelError::InvalidRevision { .. })
    ));
    ac.remove_revision(2).unwrap();
    ac.remove_revision(1).unwrap();
    assert_eq!(ac.revision(), 0);
    assert_eq!(ac.revisions(), vec![0]);
}

#[test]
fn block_children_isolated_per_revision() {
    let mut tree = BlockTree::new(0, 0x100, 0);
    let root = tree.root();
    tree.create_child(root, 0x00, 0x10, None).unwrap();
    tree.create_child(root, 0x10, 0x10, None).unwrap();
    let own: Vec<_> = tree.children(root, None).to_vec();

    // Adding under explicit later revisions never disturbs the no-argument
    // (creation revision) view.
    tree.create_child(root, 0x00, 0x80, Some(1)).unwrap();
    tree.create_child(root, 0x80, 0x80, Some(1)).unwrap();
    tree.create_child(root, 0x00, 0x100, Some(2)).unwrap();

    assert_eq!(tree.children(root, None), own.as_slice());
    assert_eq!(tree.children(root, Some(1)).len(), 2);
    assert_eq!(tree.children(root, Some(2)).len(), 1);
    assert_eq!(tree.revisions(root), vec![0, 1, 2]);

    let pairs: Vec<_> = tree.iter_with_revision(root).collect();
    assert_eq!(pairs.len(), 5);
}

#[test]
fn map_survives_structured_roundtrip_with_history() -> anyhow::Result<()> {
    let image = Arc::new(Image::from_bytes((0u8..32).collect::<Vec<u8>>()));
    let mut map = Map::spanning(image.clone(), 0x8000, MapPerms::new(true, false, true), None);
    map.add_address(0, 4)?;
    map.add_revision();
    map.patch_bytes(4, &[0xAA, 0xBB])?;
    map.add_address(4, 2)?;
    map.add_revision();
    map.patch_bytes(4, &[0xCC])?;

    let form = map.to_structured_form()?;
    let mut ctx = StructuredContext::new();
    ctx.images.insert(image);
    let back = Map::from_structured_form(&form, &ctx)?;

    assert_eq!(back.revision(), 2);
    assert_eq!(back.image()?[4], 0xCC);
    assert_eq!(back.address_container().image_at(1)?[4], 0xAA);
    assert_eq!(back.address_container().image_at(0)?[4], 4);
    assert_eq!(back.addresses(None, true)?.len(), 2);
    Ok(())
}

#[test]
fn remote_image_absence_still_reconstructs() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0x7F, b'E', b'L', b'F', 0, 0, 0, 0]).unwrap();
    file.flush().unwrap();

    let image = Arc::new(Image::remote(file.path()).unwrap());
    let path = file.path().to_path_buf();
    let mut ac = AddressContainer::new(ByteContainer::spanning(image, 0, None));
    ac.add_revision();
    ac.patch_bytes(0, &[0xFF]).unwrap();

    drop(file);
    assert!(!path.exists());

    // The backing file is gone: the base degrades to zeroes, the patch
    // still overlays.
    let bytes = ac.image().unwrap();
    assert_eq!(bytes[0], 0xFF);
    assert_eq!(&bytes[1..], &[0u8; 7]);
}
