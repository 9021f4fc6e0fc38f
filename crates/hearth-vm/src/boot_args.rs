//! Kernel command-line normalization for the root device.
//!
//! The root drive is always registered with Firecracker under
//! [`ROOT_DRIVE_ID`]. Firecracker exposes a drive's id as its virtio serial,
//! so the guest can address the root disk by a name that does not depend on
//! attach order. The `root=` argument is rewritten to that name.
//!
//! `/dev/disk/by-id/...` is a udev symlink: the guest needs an initramfs that
//! runs udev before mounting root. Guests booting without one should pass
//! `root=PARTUUID=...` or `root=PARTLABEL=...`, which the kernel resolves
//! itself and which are left untouched.

/// Wire identifier of the root drive, regardless of the declared `drive_id`.
pub const ROOT_DRIVE_ID: &str = "rootfs";

/// Block device path conventionally used for the first virtio disk.
const CONVENTIONAL_ROOT_DEVICE: &str = "/dev/vda";

/// Root references the kernel resolves without userspace.
const KERNEL_RESOLVED_PREFIXES: [&str; 2] = ["PARTUUID=", "PARTLABEL="];

/// Root device path derived from [`ROOT_DRIVE_ID`].
pub fn stable_root_device() -> String {
    format!("/dev/disk/by-id/virtio-{ROOT_DRIVE_ID}")
}

/// Rewrite the `root=` argument of a kernel command line.
///
/// - a `root=PARTUUID=...`, `root=PARTLABEL=...` or `root=<stable device>`
///   argument is kept as is;
/// - `root=/dev/vda` is rewritten to the stable device;
/// - otherwise the stable root argument is appended.
///
/// Applying it to its own output returns the same string.
pub fn normalize(boot_args: &str) -> String {
    let stable = stable_root_device();

    let already_stable = boot_args
        .split_whitespace()
        .filter_map(|arg| arg.strip_prefix("root="))
        .any(|device| {
            device == stable
                || KERNEL_RESOLVED_PREFIXES
                    .iter()
                    .any(|prefix| device.starts_with(*prefix))
        });
    if already_stable {
        return boot_args.to_string();
    }

    let stable_arg = format!("root={stable}");
    let mut rewritten = false;
    let mut args: Vec<&str> = boot_args
        .split_whitespace()
        .map(|arg| match arg.strip_prefix("root=") {
            Some(CONVENTIONAL_ROOT_DEVICE) => {
                rewritten = true;
                stable_arg.as_str()
            }
            _ => arg,
        })
        .collect();
    if !rewritten {
        args.push(&stable_arg);
    }
    args.join(" ")
}
