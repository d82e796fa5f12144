#[cfg(test)]
mod tests {
    use alloc::{string::String, sync::Arc, vec};

    use crate::{
        storage::{MemStorage, StorageFaults},
        Credentials, FileSystemType, FsRegistry, MountOptions, NodeKind, SfsError, SfsFsType,
        SfsPermission, SfsSuperBlock, SFS_MAGIC, SFS_NAME,
    };

    fn init() -> Arc<MemStorage> {
        let _ = env_logger::builder().is_test(true).try_init();
        MemStorage::new().into_arc()
    }

    #[test]
    fn test_mount_unmount() {
        let storage = init();
        let sb = SfsSuperBlock::fill_super(storage.clone(), 0, MountOptions::default()).unwrap();

        assert!(sb.is_mounted());
        assert_eq!(storage.live_nodes(), 1);
        assert!(storage.private_bytes() > 0);
        assert_eq!(storage.materialized_roots(), 1);
        assert_eq!(sb.magic(), SFS_MAGIC);
        assert_eq!(sb.block_size(), 4096);
        assert_eq!(sb.block_size_bits(), 12);
        assert_eq!(sb.max_bytes(), i64::MAX as u64);
        assert_eq!(sb.time_gran(), 1);
        assert_eq!(sb.mount_options(), Some(MountOptions::default()));

        let root = sb.root().unwrap();
        assert_eq!(root.kind(), NodeKind::Directory);
        assert_eq!(root.nlink(), 2);
        drop(root);

        sb.kill_sb();

        assert!(!sb.is_mounted());
        assert_eq!(storage.live_nodes(), 0);
        assert_eq!(storage.private_bytes(), 0);
        assert_eq!(storage.reclaimed_trees(), 1);
        assert_eq!(sb.root().map(|_| ()), Err(SfsError::NotMounted));
        assert_eq!(sb.mount_options(), None);
    }

    #[test]
    fn test_double_unmount() {
        let storage = init();
        let sb = SfsSuperBlock::fill_super(storage.clone(), 0, MountOptions::default()).unwrap();

        sb.kill_sb();
        sb.kill_sb();
        sb.put_super();

        assert_eq!(storage.private_bytes(), 0);
        assert_eq!(storage.reclaimed_trees(), 1);
        drop(sb);
        assert_eq!(storage.reclaimed_trees(), 1);
    }

    #[test]
    fn test_unmount_reclaims_tree() {
        let storage = init();
        let sb = SfsSuperBlock::fill_super(storage.clone(), 0, MountOptions::default()).unwrap();
        {
            let root = sb.root().unwrap();
            let top = root.as_dir().unwrap();
            let a = top
                .make_directory("a", SfsPermission::from_bits_truncate(0o755))
                .unwrap();
            let a_dir = a.as_dir().unwrap();
            a_dir
                .create("f", SfsPermission::from_bits_truncate(0o644))
                .unwrap();
            a_dir.make_symlink("l", "f").unwrap();
        }
        assert_eq!(storage.live_nodes(), 4);

        drop(sb);

        assert_eq!(storage.live_nodes(), 0);
        assert_eq!(storage.private_bytes(), 0);
    }

    #[test]
    fn test_unmount_deep_tree() {
        let storage = init();
        let sb = SfsSuperBlock::fill_super(storage.clone(), 0, MountOptions::default()).unwrap();
        let mut cur = sb.root().unwrap();
        for _ in 0..10_000 {
            let next = cur
                .as_dir()
                .unwrap()
                .make_directory("d", SfsPermission::from_bits_truncate(0o755))
                .unwrap();
            cur = next;
        }
        drop(cur);
        assert_eq!(storage.live_nodes(), 10_001);

        sb.kill_sb();

        assert_eq!(storage.live_nodes(), 0);
        assert_eq!(storage.private_bytes(), 0);
    }

    #[test]
    fn test_drop_deep_subtree() {
        let storage = init();
        let sb = SfsSuperBlock::fill_super(storage.clone(), 0, MountOptions::default()).unwrap();
        let root = sb.root().unwrap();
        let top = root
            .as_dir()
            .unwrap()
            .make_directory("top", SfsPermission::from_bits_truncate(0o755))
            .unwrap();
        let mut cur = top.clone();
        for _ in 0..10_000 {
            let next = cur
                .as_dir()
                .unwrap()
                .make_directory("d", SfsPermission::from_bits_truncate(0o755))
                .unwrap();
            cur = next;
        }
        // a handle deep inside keeps its own subtree alive
        let middle = top.as_dir().unwrap().lookup("d").unwrap();
        drop(cur);
        drop(root);
        drop(top);
        sb.kill_sb();

        assert_eq!(storage.live_nodes(), 10_000);
        drop(middle);
        assert_eq!(storage.live_nodes(), 0);
    }

    #[test]
    fn test_mount_rollback() {
        for fault in [
            StorageFaults::ALLOCATE_NODE,
            StorageFaults::ALLOCATE_PRIVATE,
            StorageFaults::MATERIALIZE_ROOT,
        ] {
            let storage = init();
            storage.inject(fault);

            let res = SfsSuperBlock::fill_super(storage.clone(), 0, MountOptions::default());

            assert_eq!(res.map(|_| ()), Err(SfsError::NoMemory), "{:?}", fault);
            assert_eq!(storage.live_nodes(), 0, "{:?}", fault);
            assert_eq!(storage.private_bytes(), 0, "{:?}", fault);
            assert_eq!(storage.materialized_roots(), 0, "{:?}", fault);

            storage.clear(fault);
            let sb = SfsSuperBlock::fill_super(storage.clone(), 0, MountOptions::default());
            assert!(sb.is_ok());
        }
    }

    #[test]
    fn test_root_owner() {
        let storage = init();
        storage.set_credentials(Credentials { uid: 10, gid: 20 });
        let fs = SfsFsType::new(storage.clone());

        let sb = fs.mount(0, b"").unwrap();
        let attr = sb.root().unwrap().getattr();
        assert_eq!((attr.uid, attr.gid), (10, 20));

        let sb = fs
            .mount(0, br#"{"mode": 448, "uid": 1000, "gid": 1000}"#)
            .unwrap();
        let attr = sb.root().unwrap().getattr();
        assert_eq!((attr.uid, attr.gid), (1000, 1000));
        assert_eq!(attr.mode, 0o40700);
    }

    #[test]
    fn test_mount_options() {
        let storage = init();
        let fs = SfsFsType::new(storage.clone());

        let sb = fs
            .mount(7, br#"{"block_size_bits": 10, "time_gran": 1000000000}"#)
            .unwrap();
        assert_eq!(sb.block_size(), 1024);
        assert_eq!(sb.mount_flags(), Some(7));

        let root = sb.root().unwrap();
        let f = root
            .as_dir()
            .unwrap()
            .create("f", SfsPermission::from_bits_truncate(0o644))
            .unwrap();
        let attr = f.getattr();
        assert_eq!(attr.blksize, 1024);
        assert_eq!(attr.mtime.nsec, 0);
        assert_eq!(root.getattr().mtime.nsec, 0);

        assert!(matches!(
            fs.mount(0, br#"{"block_size_bits": 4}"#).map(|_| ()),
            Err(SfsError::InvalidOptions(_))
        ));
        assert_eq!(storage.live_nodes(), 2);
    }

    #[test]
    fn test_statfs() {
        let storage = init();
        let fs = SfsFsType::new(storage);
        let sb = fs.mount(0, br#"{"block_size_bits": 9}"#).unwrap();

        let st = sb.statfs();

        assert_eq!(st.f_type, SFS_MAGIC);
        assert_eq!(st.f_bsize, 512);
        assert_eq!(st.f_namelen, 255);
        assert_eq!(st.f_blocks, 0);
        assert_eq!(st.f_files, 0);
    }

    #[test]
    fn test_registry() {
        let storage = init();
        let registry = FsRegistry::new();
        assert_eq!(
            registry.mount(SFS_NAME, 0, b"").map(|_| ()),
            Err(SfsError::NotFound)
        );

        let registration = registry
            .register(Arc::new(SfsFsType::new(storage.clone())))
            .unwrap();
        assert_eq!(registration.name(), SFS_NAME);
        assert_eq!(registry.names(), vec![String::from(SFS_NAME)]);
        assert!(matches!(
            registry.register(Arc::new(SfsFsType::new(storage.clone()))),
            Err(SfsError::AlreadyExists)
        ));

        let sb = registry.mount(SFS_NAME, 0, b"").unwrap();
        assert_eq!(storage.live_nodes(), 1);
        let fs = registry.get(SFS_NAME).unwrap();
        fs.kill_sb(&sb);
        assert_eq!(storage.live_nodes(), 0);
        assert!(!sb.is_mounted());

        registration.unregister();
        assert!(registry.get(SFS_NAME).is_none());
        assert!(registry.names().is_empty());
        assert_eq!(
            registry.mount(SFS_NAME, 0, b"").map(|_| ()),
            Err(SfsError::NotFound)
        );
    }

    #[test]
    fn test_registration_dropped() {
        let storage = init();
        let registry = FsRegistry::new();
        {
            let _registration = registry
                .register(Arc::new(SfsFsType::new(storage.clone())))
                .unwrap();
            assert!(registry.get(SFS_NAME).is_some());
        }
        assert!(registry.get(SFS_NAME).is_none());

        let again = registry.register(Arc::new(SfsFsType::new(storage)));
        assert!(again.is_ok());
    }

    #[test]
    fn test_volumes_are_independent() {
        let storage = init();
        let fs = SfsFsType::new(storage.clone());
        let one = fs.mount(0, b"").unwrap();
        let two = fs.mount(0, b"").unwrap();
        let one_root = one.root().unwrap();
        let two_root = two.root().unwrap();
        assert_ne!(one_root.ino(), two_root.ino());

        one_root
            .as_dir()
            .unwrap()
            .create("only_here", SfsPermission::from_bits_truncate(0o644))
            .unwrap();
        assert_eq!(
            two_root.as_dir().unwrap().lookup("only_here").map(|_| ()),
            Err(SfsError::NotFound)
        );
        drop(one_root);

        one.kill_sb();
        assert!(two.is_mounted());
        assert_eq!(storage.live_nodes(), 1);
    }
}
