//! samplefs mount demo
//!
//! Registers samplefs on an in-memory storage layer, mounts a volume with the
//! given options, builds a small tree and prints every node's attributes.
//!
//! ```text
//! cargo run --example mount_demo -- --options '{"mode": 448}' --depth 2
//! ```

use std::sync::Arc;

use clap::Parser;
use samplefs::{
    DeviceId, Directory, FsRegistry, InodeRef, MemStorage, NodeKind, RenameFlags, SfsFsType,
    SfsPermission, SFS_NAME,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Mount samplefs in memory and walk the tree")]
struct Args {
    /// JSON mount options
    #[arg(short, long, default_value = "")]
    options: String,
    /// Levels of nested directories to create
    #[arg(short, long, default_value_t = 2)]
    depth: usize,
    /// Print attributes as pretty JSON
    #[arg(long)]
    pretty: bool,
}

fn perm(bits: u16) -> SfsPermission {
    SfsPermission::from_bits_truncate(bits)
}

fn build(dir: &Directory<'_>, depth: usize) -> Result<(), samplefs::SfsError> {
    dir.create("file", perm(0o644))?;
    dir.make_symlink("link", "file")?;
    if depth == 0 {
        return Ok(());
    }
    let sub = dir.make_directory("tmp", perm(0o755))?;
    dir.rename("tmp", &sub.as_dir()?, "nested", RenameFlags::empty())
        .unwrap_or_else(|e| println!("  rename into own child refused: {}", e));
    dir.rename("tmp", dir, "sub", RenameFlags::empty())?;
    build(&sub.as_dir()?, depth - 1)
}

fn walk(path: &str, node: &InodeRef, pretty: bool) {
    let attr = node.getattr();
    let json = if pretty {
        serde_json::to_string_pretty(&attr)
    } else {
        serde_json::to_string(&attr)
    };
    match json {
        Ok(json) => println!("{} {}", path, json),
        Err(e) => println!("{} <{}>", path, e),
    }
    if let Ok(dir) = node.as_dir() {
        for entry in dir.readdir().into_iter().skip(2) {
            if let Ok(child) = dir.lookup(&entry.name) {
                walk(&format!("{}/{}", path.trim_end_matches('/'), entry.name), &child, pretty);
            }
        }
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let storage = MemStorage::new().into_arc();
    let registry = FsRegistry::new();
    let registration = registry
        .register(Arc::new(SfsFsType::new(storage.clone())))
        .expect("register samplefs");
    println!("registered: {:?}", registry.names());

    let sb = match registry.mount(SFS_NAME, 0, args.options.as_bytes()) {
        Ok(sb) => sb,
        Err(e) => {
            eprintln!("mount failed: {}", e);
            std::process::exit(1);
        }
    };
    println!("statfs: {}", serde_json::to_string(&sb.statfs()).unwrap());

    let root = sb.root().expect("root");
    let top = root.as_dir().expect("root is a directory");
    build(&top, args.depth).expect("build tree");
    top.make_node("null", NodeKind::CharDevice, perm(0o666), Some(DeviceId::new(1, 3)))
        .expect("mknod");

    walk("/", &root, args.pretty);
    println!("live nodes: {}", storage.live_nodes());

    drop(root);
    sb.kill_sb();
    println!("after unmount: {} live nodes", storage.live_nodes());
    registration.unregister();
}
