use windows::{
    Win32::Foundation::HWND,
    Win32::UI::WindowsAndMessaging::{FindWindowExA, GetClientRect, IsWindow},
};

use crate::core::coords::WindowId;

pub fn to_hwnd(window: WindowId) -> HWND {
    HWND(window.raw() as isize)
}

pub fn to_window_id(hwnd: HWND) -> WindowId {
    WindowId(hwnd.0 as usize)
}

/// Find every top-level window of the given class name
pub fn find_windows_by_class(class: &str) -> Vec<WindowId> {
    let class_c = format!("{}\0", class);
    let mut found = Vec::new();
    let mut prev = HWND(0);

    unsafe {
        loop {
            let hwnd = FindWindowExA(
                HWND(0),
                prev,
                windows::core::PCSTR(class_c.as_ptr()),
                windows::core::PCSTR::null(),
            );

            if hwnd.0 == 0 {
                break;
            }
            if IsWindow(hwnd).as_bool() {
                found.push(to_window_id(hwnd));
            }
            prev = hwnd;
        }
    }

    found
}

/// Check if window handle is still valid
pub fn is_window_valid(window: WindowId) -> bool {
    unsafe { IsWindow(to_hwnd(window)).as_bool() }
}

/// Get client-area size in pixels
pub fn client_size(window: WindowId) -> Option<(i32, i32)> {
    unsafe {
        let mut rect = windows::Win32::Foundation::RECT::default();
        if GetClientRect(to_hwnd(window), &mut rect).is_ok() {
            Some((rect.right - rect.left, rect.bottom - rect.top))
        } else {
            None
        }
    }
}
