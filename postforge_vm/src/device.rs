//! Output device interface.
//!
//! `showpage` resolves the device by the `/OutputDevice` name in the page
//! device dictionary and hands it the finished display list. Rasterization
//! lives entirely on the other side of this trait.

use postforge_core::PsResult;
use postforge_graphics::DisplayList;
use std::cell::RefCell;
use std::rc::Rc;

/// Page geometry handed to the device along with the display list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSetup {
    /// `/PageSize` in points.
    pub width: f64,
    pub height: f64,
    /// `/HWResolution`.
    pub dpi_x: f64,
    pub dpi_y: f64,
    /// `/NumCopies` (1 when unset or null).
    pub copies: i32,
    /// Running page counter.
    pub page_count: i32,
}

/// An output device consuming finished pages.
pub trait Device {
    /// Consume one page. Called once per `showpage`/`copypage` regardless
    /// of `copies`; the count is in `setup`.
    fn show_page(&mut self, list: &DisplayList, setup: &PageSetup) -> PsResult<()>;

    /// Downcast hook for the built-in capture device.
    fn as_capture(&self) -> Option<&CaptureDevice> {
        None
    }
}

/// Shared handle to the pages a [`CaptureDevice`] has received.
pub type PageCapture = Rc<RefCell<Vec<DisplayList>>>;

/// The default in-memory device: it stores every page it is handed, so
/// hosts and tests can inspect the exact display lists the interpreter
/// produced.
pub struct CaptureDevice {
    pages: PageCapture,
}

impl CaptureDevice {
    pub fn new() -> Self {
        Self {
            pages: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// A handle that stays valid after the device moves into the registry.
    pub fn capture_handle(&self) -> PageCapture {
        Rc::clone(&self.pages)
    }

    pub fn pages(&self) -> Vec<DisplayList> {
        self.pages.borrow().clone()
    }
}

impl Default for CaptureDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for CaptureDevice {
    fn show_page(&mut self, list: &DisplayList, _setup: &PageSetup) -> PsResult<()> {
        self.pages.borrow_mut().push(list.clone());
        Ok(())
    }

    fn as_capture(&self) -> Option<&CaptureDevice> {
        Some(self)
    }
}

/// A device that discards everything (`nulldevice` installs it).
pub struct NullDevice;

impl Device for NullDevice {
    fn show_page(&mut self, _list: &DisplayList, _setup: &PageSetup) -> PsResult<()> {
        Ok(())
    }
}
