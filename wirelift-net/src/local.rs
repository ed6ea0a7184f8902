//! Local host probes: interface addresses, hardware addresses, names

use std::ffi::{CStr, CString};
use std::net::IpAddr;

use crate::error::{Error, Result};

/// Addresses assigned to local non-loopback interfaces
pub fn local_addresses() -> Result<Vec<IpAddr>> {
    let mut addrs = Vec::new();
    for iface in get_if_addrs::get_if_addrs()? {
        if iface.is_loopback() {
            continue;
        }
        let ip = iface.ip();
        if !addrs.contains(&ip) {
            addrs.push(ip);
        }
    }
    Ok(addrs)
}

/// Names of local interfaces that carry at least one address
pub fn interface_names() -> Result<Vec<String>> {
    let mut names: Vec<String> = Vec::new();
    for iface in get_if_addrs::get_if_addrs()? {
        if !names.contains(&iface.name) {
            names.push(iface.name);
        }
    }
    Ok(names)
}

/// Get the interface index for a given interface name
#[cfg(unix)]
pub fn interface_index(name: &str) -> Result<u32> {
    let c_name = CString::new(name).map_err(|_| Error::InterfaceNotFound(name.to_string()))?;

    // SAFETY: if_nametoindex is safe to call with a valid C string
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };

    if index == 0 {
        return Err(Error::InterfaceNotFound(name.to_string()));
    }

    Ok(index)
}

#[cfg(not(unix))]
pub fn interface_index(name: &str) -> Result<u32> {
    Err(Error::InterfaceNotFound(name.to_string()))
}

/// Hardware address of an interface, as reported by sysfs
pub fn mac_address(name: &str) -> Option<String> {
    let path = format!("/sys/class/net/{}/address", name);
    let mac = std::fs::read_to_string(path).ok()?;
    let mac = mac.trim();
    if mac.is_empty() || mac == "00:00:00:00:00:00" {
        None
    } else {
        Some(mac.to_string())
    }
}

/// Hardware address of the first physical looking interface
///
/// Interfaces named in `skip` (usually tunnels) are passed over.
pub fn best_local_mac(skip: &[&str]) -> Option<String> {
    let names = interface_names().ok()?;
    names
        .iter()
        .filter(|name| !skip.contains(&name.as_str()))
        .find_map(|name| mac_address(name))
}

/// Host name of this machine
#[cfg(unix)]
pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes and gethostname NUL terminates on success
    unsafe {
        if libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) == 0 {
            if let Ok(cstr) = CStr::from_bytes_until_nul(&buf) {
                return cstr.to_string_lossy().into_owned();
            }
        }
    }
    "unknown".to_string()
}

#[cfg(not(unix))]
pub fn hostname() -> String {
    "unknown".to_string()
}

/// Best effort reverse lookup of an address
#[cfg(unix)]
pub fn reverse_lookup(addr: IpAddr) -> Option<String> {
    use std::mem;

    let mut host = [0 as libc::c_char; 1025];
    // SAFETY: the sockaddr structs are zeroed then filled, and host is a
    // writable buffer of the length passed
    let rc = unsafe {
        match addr {
            IpAddr::V4(v4) => {
                let mut sa: libc::sockaddr_in = mem::zeroed();
                sa.sin_family = libc::AF_INET as libc::sa_family_t;
                sa.sin_addr = libc::in_addr {
                    s_addr: u32::from_ne_bytes(v4.octets()),
                };
                libc::getnameinfo(
                    &sa as *const libc::sockaddr_in as *const libc::sockaddr,
                    mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
                    host.as_mut_ptr(),
                    host.len() as libc::socklen_t,
                    std::ptr::null_mut(),
                    0,
                    libc::NI_NAMEREQD,
                )
            }
            IpAddr::V6(v6) => {
                let mut sa: libc::sockaddr_in6 = mem::zeroed();
                sa.sin6_family = libc::AF_INET6 as libc::sa_family_t;
                sa.sin6_addr = libc::in6_addr {
                    s6_addr: v6.octets(),
                };
                libc::getnameinfo(
                    &sa as *const libc::sockaddr_in6 as *const libc::sockaddr,
                    mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t,
                    host.as_mut_ptr(),
                    host.len() as libc::socklen_t,
                    std::ptr::null_mut(),
                    0,
                    libc::NI_NAMEREQD,
                )
            }
        }
    };
    if rc != 0 {
        return None;
    }
    // SAFETY: getnameinfo succeeded so host holds a NUL terminated string
    let name = unsafe { CStr::from_ptr(host.as_ptr()) };
    Some(name.to_string_lossy().into_owned())
}

#[cfg(not(unix))]
pub fn reverse_lookup(_addr: IpAddr) -> Option<String> {
    None
}
