//! Mount point validation and option assembly.

use std::path::Path;

use fuser::MountOption;

use crate::bridge::BucketFilesystem;
use crate::error::{FsError, FsResult};
use crate::ops::FsCore;

/// Mount options for a bucket mount: kernel-enforced permissions, an
/// identifying fsname, and auto-unmount on process exit.
pub fn mount_options(bucket: &str, volname: Option<&str>, iosize: Option<u32>) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::DefaultPermissions,
        MountOption::FSName(format!("s3fs:{}", bucket)),
        MountOption::AutoUnmount,
    ];
    if let Some(volname) = volname {
        options.push(MountOption::CUSTOM(format!("volname={}", volname)));
    }
    if let Some(iosize) = iosize {
        options.push(MountOption::CUSTOM(format!("iosize={}", iosize)));
    }
    options
}

/// Checks that a mountpoint exists and is a directory.
pub fn validate_mountpoint(path: &Path) -> FsResult<()> {
    if !path.exists() {
        return Err(FsError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("mount point does not exist: {}", path.display()),
        )));
    }
    if !path.is_dir() {
        return Err(FsError::InvalidArgument("mount point is not a directory"));
    }
    Ok(())
}

/// Mounts the filesystem and runs the FUSE session until unmount.
pub fn serve(
    core: FsCore,
    mountpoint: &Path,
    volname: Option<&str>,
    iosize: Option<u32>,
) -> FsResult<()> {
    validate_mountpoint(mountpoint)?;
    let options = mount_options(core.bucket(), volname, iosize);
    let filesystem = BucketFilesystem::new(core);
    fuser::mount2(filesystem, mountpoint, &options)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_options_fsname() {
        let options = mount_options("demo", None, None);
        assert!(options
            .iter()
            .any(|o| matches!(o, MountOption::FSName(name) if name == "s3fs:demo")));
        assert!(options
            .iter()
            .any(|o| matches!(o, MountOption::DefaultPermissions)));
        assert!(options.iter().any(|o| matches!(o, MountOption::AutoUnmount)));
    }

    #[test]
    fn test_mount_options_volname_and_iosize() {
        let options = mount_options("demo", Some("Demo Bucket"), Some(262_144));
        assert!(options
            .iter()
            .any(|o| matches!(o, MountOption::CUSTOM(s) if s == "volname=Demo Bucket")));
        assert!(options
            .iter()
            .any(|o| matches!(o, MountOption::CUSTOM(s) if s == "iosize=262144")));
    }

    #[test]
    fn test_validate_mountpoint_missing() {
        let result = validate_mountpoint(Path::new("/no/such/mountpoint"));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_mountpoint_file_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = validate_mountpoint(file.path());
        assert!(matches!(result, Err(FsError::InvalidArgument(_))));
    }

    #[test]
    fn test_validate_mountpoint_directory_ok() {
        let dir = tempfile::tempdir().unwrap();
        validate_mountpoint(dir.path()).unwrap();
    }
}
