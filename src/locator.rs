//! Device locator.
//!
//! Picks exactly one target card from a fresh snapshot of the host's block
//! devices, or fails. Selecting the wrong device destroys data, so every
//! ambiguity is a hard error and never a guess.

use crate::device::{Access, BlockDevice, DeviceHandle};
use crate::error::{Error, Result};
use crate::layout::{has_magic, MAGIC};
use crate::options::Options;

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Mount points whose backing disks are never candidates.
const SYSTEM_MOUNTS: &[&str] = &["/", "/boot", "/boot/efi", "/usr", "/var", "/home"];

/// Kernel device name prefixes that are never removable cards.
const VIRTUAL_PREFIXES: &[&str] = &["loop", "ram", "zram", "dm-", "nbd", "md", "sr", "fd"];

/// Operation the selected device is wanted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Initialize,
    Erase,
}

impl Operation {
    /// Whether the operation writes to the device.
    pub fn is_destructive(self) -> bool {
        !matches!(self, Operation::Read)
    }
}

/// How the caller narrows the choice of device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Choose automatically among the enumerated devices.
    Auto,
    /// Use this device. Bypasses the removable and size filters and the
    /// ambiguity check, but never the system-device check, which also
    /// covers a partition of a system disk.
    Explicit(PathBuf),
}

/// A snapshot provider of the host's block devices.
///
/// Each call returns a fresh listing; nothing is cached between calls.
pub trait DeviceSource {
    fn snapshot(&self) -> Result<Vec<BlockDevice>>;

    /// Whole disk that `path` is a partition of, when the source knows.
    fn parent_disk(&self, _path: &Path) -> Option<PathBuf> {
        None
    }
}

/// A device under evaluation, with the reasons it was turned down.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub device: BlockDevice,
    pub score: i32,
    pub rejections: Vec<String>,
}

impl Candidate {
    fn evaluate(device: BlockDevice, op: Operation, options: &Options) -> Self {
        let mut rejections = Vec::new();

        if device.system {
            rejections.push("backs the host system".to_string());
        }
        if device.size > options.max_device_size {
            rejections.push(format!(
                "{} exceeds the {} byte card size limit",
                device.size_human(),
                options.max_device_size
            ));
        }
        if !device.removable && !options.allow_fixed {
            rejections.push("not removable".to_string());
        }
        if op.is_destructive() && device.read_only {
            rejections.push("read-only".to_string());
        }

        let score = if device.removable { 10 } else { 0 };
        Self {
            device,
            score,
            rejections,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.rejections.is_empty()
    }
}

/// Select the device to operate on.
pub fn locate(
    source: &dyn DeviceSource,
    selection: &Selection,
    op: Operation,
    options: &Options,
) -> Result<BlockDevice> {
    let snapshot = source.snapshot()?;
    debug!(count = snapshot.len(), ?op, "enumerated block devices");

    match selection {
        Selection::Explicit(path) => locate_explicit(source, snapshot, path, op),
        Selection::Auto => locate_auto(snapshot, op, options),
    }
}

fn locate_explicit(
    source: &dyn DeviceSource,
    snapshot: Vec<BlockDevice>,
    path: &Path,
    op: Operation,
) -> Result<BlockDevice> {
    let wanted = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let same = |d: &BlockDevice| {
        d.path == path || fs::canonicalize(&d.path).map(|p| p == wanted).unwrap_or(false)
    };

    let device = match snapshot.iter().find(|&d| same(d)) {
        Some(device) => device.clone(),
        None => {
            // A partition inherits the verdict of the disk it lives on.
            let parent = source.parent_disk(path).and_then(|disk| {
                snapshot
                    .iter()
                    .find(|d| d.path == disk || same_file(&d.path, &disk))
            });
            let parent = parent.or_else(|| {
                snapshot
                    .iter()
                    .find(|d| is_partition_of(&d.path, path) || is_partition_of(&d.path, &wanted))
            });
            if let Some(disk) = parent {
                debug!(partition = %path.display(), disk = %disk.path.display(), "explicit path is a partition");
                check_explicit(path, disk, op)?;
            }
            BlockDevice::probe(path)?
        }
    };

    check_explicit(path, &device, op)?;

    info!(device = %device.path.display(), "using explicitly selected device");
    Ok(device)
}

fn check_explicit(path: &Path, device: &BlockDevice, op: Operation) -> Result<()> {
    if device.system {
        return Err(Error::NoDeviceFound {
            rejected: vec![format!("{}: backs the host system", path.display())],
        });
    }
    if op.is_destructive() && device.read_only {
        return Err(Error::ReadOnlyDevice(path.to_path_buf()));
    }
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Whether `path` is named like a partition of `disk` in the same directory
/// (`sda` -> `sda3`, `mmcblk0` -> `mmcblk0p1`).
fn is_partition_of(disk: &Path, path: &Path) -> bool {
    if disk.parent() != path.parent() {
        return false;
    }
    let (Some(disk), Some(name)) = (
        disk.file_name().and_then(|n| n.to_str()),
        path.file_name().and_then(|n| n.to_str()),
    ) else {
        return false;
    };
    let Some(rest) = name.strip_prefix(disk) else {
        return false;
    };
    let digits = if disk.ends_with(|c: char| c.is_ascii_digit()) {
        match rest.strip_prefix('p') {
            Some(digits) => digits,
            None => return false,
        }
    } else {
        rest
    };
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn locate_auto(snapshot: Vec<BlockDevice>, op: Operation, options: &Options) -> Result<BlockDevice> {
    let (mut accepted, rejected): (Vec<Candidate>, Vec<Candidate>) = snapshot
        .into_iter()
        .map(|d| Candidate::evaluate(d, op, options))
        .partition(Candidate::is_accepted);

    for c in &rejected {
        debug!(device = %c.device.path.display(), reasons = ?c.rejections, "rejected candidate");
    }

    match accepted.len() {
        0 => Err(Error::NoDeviceFound {
            rejected: rejected
                .iter()
                .map(|c| format!("{}: {}", c.device.path.display(), c.rejections.join(", ")))
                .collect(),
        }),
        1 => {
            let device = accepted.remove(0).device;
            info!(device = %device.path.display(), size = %device.size_human(), "selected device");
            Ok(device)
        }
        _ if op.is_destructive() => Err(ambiguous(&accepted)),
        _ => break_tie_by_signature(accepted),
    }
}

/// Prefer the one candidate whose first block carries the NoFS magic.
///
/// A candidate that cannot be probed might be the card, so it blocks the
/// decision just like a second match would.
fn break_tie_by_signature(mut candidates: Vec<Candidate>) -> Result<BlockDevice> {
    let mut unknown = 0;
    for c in &mut candidates {
        match probe_signature(&c.device.path) {
            Ok(true) => c.score += 100,
            Ok(false) => {}
            Err(e) => {
                debug!(device = %c.device.path.display(), error = %e, "signature probe failed");
                unknown += 1;
            }
        }
    }

    let signed: Vec<&Candidate> = candidates.iter().filter(|c| c.score >= 100).collect();
    if signed.len() == 1 && unknown == 0 {
        let device = signed[0].device.clone();
        info!(device = %device.path.display(), "selected device carrying a NoFS signature");
        return Ok(device);
    }
    Err(ambiguous(&candidates))
}

fn probe_signature(path: &Path) -> Result<bool> {
    let handle = DeviceHandle::open(path, Access::Read)?;
    if handle.size() < MAGIC.len() as u64 {
        return Ok(false);
    }
    Ok(has_magic(&handle.read_at(0, MAGIC.len())?))
}

fn ambiguous(candidates: &[Candidate]) -> Error {
    Error::AmbiguousDevice {
        candidates: candidates.iter().map(|c| c.device.path.clone()).collect(),
    }
}

/// Enumerates devices from Linux sysfs.
#[derive(Debug, Clone)]
pub struct SysfsSource {
    sys_block: PathBuf,
    dev_dir: PathBuf,
    mountinfo: PathBuf,
    swaps: PathBuf,
}

impl Default for SysfsSource {
    fn default() -> Self {
        Self::with_paths("/sys/block", "/dev", "/proc/self/mountinfo", "/proc/swaps")
    }
}

impl SysfsSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read from an alternative sysfs/procfs layout.
    ///
    /// `mountinfo` is in the `/proc/self/mountinfo` format.
    pub fn with_paths(
        sys_block: impl Into<PathBuf>,
        dev_dir: impl Into<PathBuf>,
        mountinfo: impl Into<PathBuf>,
        swaps: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sys_block: sys_block.into(),
            dev_dir: dev_dir.into(),
            mountinfo: mountinfo.into(),
            swaps: swaps.into(),
        }
    }

    fn read_attr(&self, name: &str, attr: &str) -> Option<String> {
        fs::read_to_string(self.sys_block.join(name).join(attr))
            .ok()
            .map(|s| s.trim().to_string())
    }

    fn parse_device(&self, name: &str, system: &[String]) -> Option<BlockDevice> {
        let sectors: u64 = self.read_attr(name, "size")?.parse().ok()?;
        let size = sectors * 512;
        if size == 0 {
            return None;
        }

        let block_size = self
            .read_attr(name, "queue/logical_block_size")
            .and_then(|s| s.parse().ok())
            .unwrap_or(512);

        Some(BlockDevice {
            path: self.dev_dir.join(name),
            size,
            block_size,
            removable: self.read_attr(name, "removable").as_deref() == Some("1"),
            read_only: self.read_attr(name, "ro").as_deref() == Some("1"),
            system: system.iter().any(|s| s == name),
        })
    }

    /// Names of whole disks backing system mounts and swap.
    ///
    /// Mounts are matched by device number first, since the source column
    /// can be an alias such as `/dev/root` that has no sysfs entry.
    fn system_disks(&self) -> Vec<String> {
        let mut disks = Vec::new();
        let mut sources = Vec::new();

        if let Ok(mountinfo) = fs::read_to_string(&self.mountinfo) {
            for line in mountinfo.lines() {
                let Some(mount) = MountInfo::parse(line) else {
                    continue;
                };
                if !SYSTEM_MOUNTS.contains(&mount.target) {
                    continue;
                }
                match self.name_for_devnum(mount.devnum) {
                    Some(name) => self.backing_disks(&name, &mut disks, 0),
                    None => sources.push(mount.source.to_string()),
                }
            }
        }
        if let Ok(swaps) = fs::read_to_string(&self.swaps) {
            // First line is a column header.
            sources.extend(swaps.lines().skip(1).filter_map(|l| l.split_whitespace().next().map(String::from)));
        }

        for source in sources.iter().filter(|s| s.starts_with('/')) {
            let resolved = fs::canonicalize(source).unwrap_or_else(|_| PathBuf::from(source));
            if let Some(name) = resolved.file_name().and_then(|n| n.to_str()) {
                self.backing_disks(name, &mut disks, 0);
            }
        }
        disks.sort();
        disks.dedup();
        disks
    }

    /// Kernel name of the disk or partition with device number `devnum`
    /// (`major:minor`).
    fn name_for_devnum(&self, devnum: &str) -> Option<String> {
        let matches = |dir: &Path| {
            fs::read_to_string(dir.join("dev"))
                .map(|s| s.trim() == devnum)
                .unwrap_or(false)
        };

        for disk in fs::read_dir(&self.sys_block).ok()?.flatten() {
            let disk_dir = disk.path();
            if matches(&disk_dir) {
                return Some(disk.file_name().to_string_lossy().to_string());
            }
            for part in fs::read_dir(&disk_dir).into_iter().flatten().flatten() {
                let part_dir = part.path();
                if part_dir.join("partition").exists() && matches(&part_dir) {
                    return Some(part.file_name().to_string_lossy().to_string());
                }
            }
        }
        None
    }

    /// Disk holding the partition called `name`.
    fn partition_disk(&self, name: &str) -> Option<String> {
        fs::read_dir(&self.sys_block)
            .ok()?
            .flatten()
            .find(|entry| entry.path().join(name).join("partition").exists())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
    }

    /// Resolve a kernel device name to the whole disks underneath it,
    /// following partitions and device-mapper slaves.
    fn backing_disks(&self, name: &str, out: &mut Vec<String>, depth: usize) {
        if depth > 8 {
            return;
        }

        let disk_dir = self.sys_block.join(name);
        if disk_dir.is_dir() {
            let slaves: Vec<String> = fs::read_dir(disk_dir.join("slaves"))
                .map(|entries| {
                    entries
                        .flatten()
                        .map(|e| e.file_name().to_string_lossy().to_string())
                        .collect()
                })
                .unwrap_or_default();

            if slaves.is_empty() {
                out.push(name.to_string());
            } else {
                for slave in slaves {
                    self.backing_disks(&slave, out, depth + 1);
                }
            }
            return;
        }

        // A partition lives under its disk: /sys/block/<disk>/<part>/partition
        out.extend(self.partition_disk(name));
    }
}

/// The fields of one `/proc/self/mountinfo` line the locator needs.
#[derive(Debug, PartialEq, Eq)]
struct MountInfo<'a> {
    devnum: &'a str,
    target: &'a str,
    source: &'a str,
}

impl<'a> MountInfo<'a> {
    /// `36 35 98:0 /mnt1 /mnt2 rw,noatime master:1 - ext3 /dev/root rw`
    fn parse(line: &'a str) -> Option<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let separator = fields.iter().position(|&f| f == "-")?;
        Some(Self {
            devnum: *fields.get(2)?,
            target: *fields.get(4)?,
            source: *fields.get(separator + 2)?,
        })
    }
}

impl DeviceSource for SysfsSource {
    fn snapshot(&self) -> Result<Vec<BlockDevice>> {
        let entries = fs::read_dir(&self.sys_block)
            .map_err(|e| Error::io(format!("list {}", self.sys_block.display()), e))?;
        let system = self.system_disks();

        let mut devices = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if VIRTUAL_PREFIXES.iter().any(|p| name.starts_with(p)) {
                continue;
            }
            if let Some(device) = self.parse_device(&name, &system) {
                devices.push(device);
            }
        }

        devices.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(devices)
    }

    fn parent_disk(&self, path: &Path) -> Option<PathBuf> {
        let resolved = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let name = resolved.file_name()?.to_str()?;
        self.partition_disk(name).map(|disk| self.dev_dir.join(disk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::layout::Header;
    use crate::writer::initialize;

    const MB: u64 = 1024 * 1024;

    struct Fixed(Vec<BlockDevice>);

    impl DeviceSource for Fixed {
        fn snapshot(&self) -> Result<Vec<BlockDevice>> {
            Ok(self.0.clone())
        }
    }

    fn card(path: &Path, size: u64) -> BlockDevice {
        BlockDevice {
            path: path.to_path_buf(),
            size,
            block_size: 512,
            removable: true,
            read_only: false,
            system: false,
        }
    }

    fn image(size: u64) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(size).unwrap();
        file
    }

    #[test]
    fn test_destructive_with_two_cards_is_ambiguous() {
        let a = image(4096);
        let b = image(4096);
        let source = Fixed(vec![card(a.path(), 64 * MB), card(b.path(), 128 * MB)]);

        for op in [Operation::Erase, Operation::Initialize] {
            let err = locate(&source, &Selection::Auto, op, &Options::default()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AmbiguousDevice);
        }

        let chosen = locate(
            &source,
            &Selection::Explicit(a.path().to_path_buf()),
            Operation::Erase,
            &Options::default(),
        )
        .unwrap();
        assert_eq!(chosen.path, a.path());
        assert_eq!(chosen.size, 64 * MB);
    }

    #[test]
    fn test_override_then_erase_scenario() {
        use crate::eraser::{erase, EraseMode};
        use crate::reader::NofsStream;

        let small = image(64 * 1024);
        let large = image(128 * 1024);
        initialize(small.path(), &Options::default()).unwrap();
        initialize(large.path(), &Options::default()).unwrap();
        let source = Fixed(vec![card(small.path(), 64 * MB), card(large.path(), 128 * MB)]);

        let err = locate(&source, &Selection::Auto, Operation::Erase, &Options::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousDevice);

        let target = locate(
            &source,
            &Selection::Explicit(small.path().to_path_buf()),
            Operation::Erase,
            &Options::default(),
        )
        .unwrap();

        erase(&target.path, EraseMode::KeepHeader, &Options::default()).unwrap();
        let mut stream = NofsStream::open(&target.path, &Options::default()).unwrap();
        assert!(stream.next().is_none());
        drop(stream);

        erase(&target.path, EraseMode::WipeHeader, &Options::default()).unwrap();
        let err = NofsStream::open(&target.path, &Options::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotNoFsFormatted);
    }

    #[test]
    fn test_filters() {
        let opts = Options::default();
        let mut system = card(Path::new("/dev/sda"), 16 * MB);
        system.system = true;
        let huge = card(Path::new("/dev/sdb"), 2 * opts.max_device_size);
        let mut fixed = card(Path::new("/dev/sdc"), 16 * MB);
        fixed.removable = false;
        let mut locked = card(Path::new("/dev/sdd"), 16 * MB);
        locked.read_only = true;

        let source = Fixed(vec![system, huge, fixed.clone(), locked]);
        let err = locate(&source, &Selection::Auto, Operation::Erase, &opts).unwrap_err();
        match err {
            Error::NoDeviceFound { rejected } => {
                assert_eq!(rejected.len(), 4);
                assert!(rejected[0].contains("host system"));
                assert!(rejected[1].contains("size limit"));
                assert!(rejected[2].contains("not removable"));
                assert!(rejected[3].contains("read-only"));
            }
            other => panic!("unexpected error: {other}"),
        }

        // The read-only card is fine for reading.
        let found = locate(&source, &Selection::Auto, Operation::Read, &opts).unwrap();
        assert_eq!(found.path, Path::new("/dev/sdd"));

        // Fixed disks only with the override.
        let source = Fixed(vec![fixed]);
        let found = locate(&source, &Selection::Auto, Operation::Erase, &opts.clone().with_allow_fixed(true)).unwrap();
        assert_eq!(found.path, Path::new("/dev/sdc"));
    }

    #[test]
    fn test_empty_snapshot() {
        let err = locate(&Fixed(vec![]), &Selection::Auto, Operation::Read, &Options::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDeviceFound);
    }

    #[test]
    fn test_explicit_never_bypasses_system_check() {
        let mut root = card(Path::new("/dev/nvme0n1"), 512 * MB);
        root.system = true;
        let source = Fixed(vec![root]);
        let err = locate(
            &source,
            &Selection::Explicit(PathBuf::from("/dev/nvme0n1")),
            Operation::Read,
            &Options::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDeviceFound);
    }

    #[test]
    fn test_explicit_image_outside_snapshot() {
        let img = image(8192);
        let found = locate(
            &Fixed(vec![]),
            &Selection::Explicit(img.path().to_path_buf()),
            Operation::Initialize,
            &Options::default(),
        )
        .unwrap();
        assert_eq!(found.size, 8192);
    }

    #[test]
    fn test_read_prefers_signed_card() {
        let blank = image(4096);
        let nofs = image(4096);
        std::fs::write(nofs.path(), Header::fresh().encode()).unwrap();

        let source = Fixed(vec![card(blank.path(), 32 * MB), card(nofs.path(), 32 * MB)]);
        let found = locate(&source, &Selection::Auto, Operation::Read, &Options::default()).unwrap();
        assert_eq!(found.path, nofs.path());

        // Two signed cards cannot be told apart.
        std::fs::write(blank.path(), Header::fresh().encode()).unwrap();
        let err = locate(&source, &Selection::Auto, Operation::Read, &Options::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousDevice);
    }

    #[test]
    fn test_unreadable_candidate_blocks_tie_break() {
        let nofs = image(4096);
        std::fs::write(nofs.path(), Header::fresh().encode()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("sdx");

        let source = Fixed(vec![card(nofs.path(), 32 * MB), card(&missing, 32 * MB)]);
        let err = locate(&source, &Selection::Auto, Operation::Read, &Options::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousDevice);
    }

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_sysfs_source() {
        let root = tempfile::tempdir().unwrap();
        let sys = root.path().join("sys/block");

        // System disk with root on a partition.
        write(&sys.join("sda/size"), "976773168\n");
        write(&sys.join("sda/removable"), "0\n");
        write(&sys.join("sda/ro"), "0\n");
        write(&sys.join("sda/dev"), "8:0\n");
        write(&sys.join("sda/sda2/partition"), "2\n");
        write(&sys.join("sda/sda2/dev"), "8:2\n");

        // Swap on an LVM volume built on nvme0n1p3.
        write(&sys.join("nvme0n1/size"), "1000215216\n");
        write(&sys.join("nvme0n1/removable"), "0\n");
        write(&sys.join("nvme0n1/nvme0n1p3/partition"), "3\n");
        write(&sys.join("dm-0/size"), "1000\n");
        fs::create_dir_all(sys.join("dm-0/slaves/nvme0n1p3")).unwrap();

        // The card.
        write(&sys.join("mmcblk0/size"), "62333952\n");
        write(&sys.join("mmcblk0/removable"), "1\n");
        write(&sys.join("mmcblk0/ro"), "0\n");
        write(&sys.join("mmcblk0/queue/logical_block_size"), "512\n");

        // Empty reader slot and a loop device.
        write(&sys.join("sdb/size"), "0\n");
        write(&sys.join("loop0/size"), "2048\n");

        let mounts = root.path().join("mountinfo");
        write(
            &mounts,
            "25 1 8:2 / / rw,relatime shared:1 - ext4 /dev/sda2 rw\n\
             40 25 179:9 / /media/x rw,nosuid - vfat /dev/mmcblk9p1 rw\n",
        );
        let swaps = root.path().join("swaps");
        write(&swaps, "Filename Type Size Used Priority\n/dev/dm-0 partition 100 0 -2\n");

        let source = SysfsSource::with_paths(&sys, "/dev", &mounts, &swaps);
        let devices = source.snapshot().unwrap();
        let names: Vec<_> = devices.iter().map(|d| d.path.clone()).collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("/dev/mmcblk0"),
                PathBuf::from("/dev/nvme0n1"),
                PathBuf::from("/dev/sda"),
            ]
        );

        let card = &devices[0];
        assert!(card.removable && !card.system);
        assert_eq!(card.size, 62333952 * 512);
        assert!(devices[1].system);
        assert!(devices[2].system);

        let found = locate(&source, &Selection::Auto, Operation::Erase, &Options::default()).unwrap();
        assert_eq!(found.path, PathBuf::from("/dev/mmcblk0"));
    }

    #[test]
    fn test_explicit_partition_of_system_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = card(&dir.path().join("sda"), 512 * MB);
        host.system = true;
        host.removable = false;
        let mut locked = card(&dir.path().join("mmcblk1"), 32 * MB);
        locked.read_only = true;
        let source = Fixed(vec![host, card(&dir.path().join("mmcblk0"), 32 * MB), locked]);
        for name in ["sda3", "mmcblk0p1", "mmcblk1p1"] {
            fs::write(dir.path().join(name), vec![0u8; 4096]).unwrap();
        }

        for op in [Operation::Initialize, Operation::Erase, Operation::Read] {
            let err = locate(
                &source,
                &Selection::Explicit(dir.path().join("sda3")),
                op,
                &Options::default(),
            )
            .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NoDeviceFound);
        }

        let found = locate(
            &source,
            &Selection::Explicit(dir.path().join("mmcblk0p1")),
            Operation::Initialize,
            &Options::default(),
        )
        .unwrap();
        assert_eq!(found.path, dir.path().join("mmcblk0p1"));

        let err = locate(
            &source,
            &Selection::Explicit(dir.path().join("mmcblk1p1")),
            Operation::Erase,
            &Options::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadOnlyDevice);
    }

    #[test]
    fn test_partition_naming() {
        let dev = Path::new("/dev");
        assert!(is_partition_of(&dev.join("sda"), &dev.join("sda3")));
        assert!(is_partition_of(&dev.join("mmcblk0"), &dev.join("mmcblk0p12")));
        assert!(!is_partition_of(&dev.join("sda"), &dev.join("sdaa1")));
        assert!(!is_partition_of(&dev.join("sda"), &dev.join("sda")));
        assert!(!is_partition_of(&dev.join("nvme0n1"), &dev.join("nvme0n10")));
        assert!(!is_partition_of(&dev.join("sda"), Path::new("/tmp/sda1")));
    }

    #[test]
    fn test_sysfs_partition_of_system_disk() {
        let root = tempfile::tempdir().unwrap();
        let sys = root.path().join("sys/block");
        let dev = root.path().join("dev");

        write(&sys.join("sda/size"), "976773168\n");
        write(&sys.join("sda/removable"), "1\n");
        write(&sys.join("sda/dev"), "8:0\n");
        write(&sys.join("sda/sda2/partition"), "2\n");
        write(&sys.join("sda/sda2/dev"), "8:2\n");
        write(&sys.join("sda/sda3/partition"), "3\n");
        write(&sys.join("sda/sda3/dev"), "8:3\n");

        let mounts = root.path().join("mountinfo");
        write(&mounts, "25 1 8:2 / / rw,relatime shared:1 - ext4 /dev/sda2 rw\n");
        let swaps = root.path().join("swaps");
        write(&swaps, "Filename Type Size Used Priority\n");

        // The unmounted partition, reached through a by-partuuid link.
        fs::create_dir_all(&dev).unwrap();
        fs::write(dev.join("sda3"), vec![0u8; 4096]).unwrap();
        let link = dev.join("disk/by-partuuid/0a1b-03");
        fs::create_dir_all(link.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink(dev.join("sda3"), &link).unwrap();

        let source = SysfsSource::with_paths(&sys, &dev, &mounts, &swaps);
        assert_eq!(source.parent_disk(&link), Some(dev.join("sda")));
        assert_eq!(source.parent_disk(&dev.join("sda")), None);

        let err = locate(
            &source,
            &Selection::Explicit(link),
            Operation::Initialize,
            &Options::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDeviceFound);
    }

    #[test]
    fn test_root_alias_resolved_by_device_number() {
        let line = "22 1 179:2 / / rw,noatime shared:1 - ext4 /dev/root rw";
        assert_eq!(
            MountInfo::parse(line),
            Some(MountInfo {
                devnum: "179:2",
                target: "/",
                source: "/dev/root",
            })
        );

        let root = tempfile::tempdir().unwrap();
        let sys = root.path().join("sys/block");

        // Single-board computer booted from its SD card.
        write(&sys.join("mmcblk0/size"), "62333952\n");
        write(&sys.join("mmcblk0/removable"), "1\n");
        write(&sys.join("mmcblk0/dev"), "179:0\n");
        write(&sys.join("mmcblk0/mmcblk0p1/partition"), "1\n");
        write(&sys.join("mmcblk0/mmcblk0p1/dev"), "179:1\n");
        write(&sys.join("mmcblk0/mmcblk0p2/partition"), "2\n");
        write(&sys.join("mmcblk0/mmcblk0p2/dev"), "179:2\n");

        let mounts = root.path().join("mountinfo");
        write(
            &mounts,
            "22 1 179:2 / / rw,noatime shared:1 - ext4 /dev/root rw\n\
             30 22 179:1 / /boot rw,relatime shared:2 - vfat /dev/mmcblk0p1 rw\n",
        );
        let swaps = root.path().join("swaps");
        write(&swaps, "Filename Type Size Used Priority\n");

        let source = SysfsSource::with_paths(&sys, "/dev", &mounts, &swaps);
        let devices = source.snapshot().unwrap();
        assert_eq!(devices.len(), 1);
        assert!(devices[0].system);

        let err = locate(&source, &Selection::Auto, Operation::Erase, &Options::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDeviceFound);
    }
}
