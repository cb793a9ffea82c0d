//! Control loop: discover, initialize, then render and send frames until the
//! keyboard goes away, and start over.

use std::convert::Infallible;
use std::error::Error;
use std::thread;
use std::time::Duration;

use roccat_vulcan::handshake::ReadyWait;
use roccat_vulcan::input::{EvdevSource, EventSource, KeyEventTranslator};
use roccat_vulcan::locate::Strategy;
use tracing::{debug, info, warn};
use vulcan_rgb_core::{BoardError, BoardInfo, HasPerKeyLighting, KeyColorMap, PinTable};

use crate::detection::BoardKind;
use crate::render::{render, Palette};

/// Everything the loop needs to reconnect
pub struct Options {
    pub board: BoardKind,
    pub strategy: Strategy,
    pub ready: ReadyWait,
    pub frame: Duration,
    pub retry: Duration,
}

/// What the loop drives while a keyboard is connected
pub trait Driver {
    /// Called after every successful handshake, before the first tick
    fn connected(
        &mut self,
        info: &'static BoardInfo,
        product_id: Option<u16>,
    ) -> Result<(), BoardError>;

    /// One poll, render and send cycle. Returns whether a frame was sent.
    fn tick(&mut self, lighting: &mut dyn HasPerKeyLighting) -> Result<bool, BoardError>;
}

/// Lighting state owned by the control loop, kept across reconnects
pub struct Session {
    pins: PinTable,
    palette: Palette,
    input: KeyEventTranslator,
    map: KeyColorMap,
    dirty: bool,
}

impl Session {
    pub fn new(pins: PinTable, palette: Palette) -> Self {
        Self {
            pins,
            palette,
            input: KeyEventTranslator::default(),
            map: KeyColorMap::filled(palette.base),
            dirty: true,
        }
    }

    /// Start from a clean slate on a freshly initialized keyboard
    pub fn reset(&mut self) {
        self.input.reset();
        self.dirty = true;
    }

    /// One poll, render and send cycle. Returns whether a frame was sent.
    pub fn tick(
        &mut self,
        source: &mut dyn EventSource,
        lighting: &mut dyn HasPerKeyLighting,
    ) -> Result<bool, BoardError> {
        let changes = self.input.poll(source)?;
        if changes == 0 && !self.dirty {
            return Ok(false);
        }
        render(&self.palette, &self.input, &mut self.map);
        lighting.send_frame(Some(&self.map), &self.pins)?;
        self.dirty = false;
        Ok(true)
    }
}

/// Held keys light up, read from the keyboard's own event device
pub struct Reactive {
    session: Session,
    source: Option<EvdevSource>,
}

impl Reactive {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            source: None,
        }
    }
}

impl Driver for Reactive {
    fn connected(
        &mut self,
        info: &'static BoardInfo,
        product_id: Option<u16>,
    ) -> Result<(), BoardError> {
        self.source = None;
        // the event node has to belong to the keyboard that was opened
        let products = product_id
            .as_ref()
            .map_or(info.product_ids, std::slice::from_ref);
        let source = EvdevSource::find(info.vendor_id, products)?;
        info!("connected to {}, reading {}", info.name, source.path().display());
        self.source = Some(source);
        self.session.reset();
        Ok(())
    }

    fn tick(&mut self, lighting: &mut dyn HasPerKeyLighting) -> Result<bool, BoardError> {
        let source = self.source.as_mut().ok_or(BoardError::InputNotFound)?;
        self.session.tick(source, lighting)
    }
}

/// Errors retrying cannot fix
fn is_fatal(e: &(dyn Error + 'static)) -> bool {
    match e.downcast_ref::<BoardError>() {
        Some(BoardError::UnknownReport(_)) => true,
        Some(_) => false,
        None => true,
    }
}

/// Run until a fatal error. Discovery, handshake and io failures end the
/// current connection and are retried after `opts.retry`.
pub fn run(opts: &Options, driver: &mut dyn Driver) -> Result<(), Box<dyn Error>> {
    let mut waiting = false;
    loop {
        let Err(e) = run_connected(opts, driver);
        if is_fatal(e.as_ref()) {
            return Err(e);
        }
        if matches!(e.downcast_ref::<BoardError>(), Some(BoardError::DeviceNotFound)) {
            if !waiting {
                info!("keyboard not found, retrying every {:?}", opts.retry);
                waiting = true;
            } else {
                debug!("keyboard not found");
            }
        } else {
            warn!("{e}, reconnecting in {:?}", opts.retry);
            waiting = false;
        }
        thread::sleep(opts.retry);
    }
}

fn run_connected(opts: &Options, driver: &mut dyn Driver) -> Result<Infallible, Box<dyn Error>> {
    let mut board = opts.board.as_board(opts.strategy, opts.ready)?;
    let info = board.info();
    let product_id = board.product_id();
    let lighting = board
        .as_per_key_lighting()
        .ok_or("board does not support per-key lighting")?;
    lighting.enable_host_lighting()?;
    driver.connected(info, product_id)?;

    loop {
        driver.tick(lighting)?;
        thread::sleep(opts.frame);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;

    use roccat_vulcan::input::RawEvent;
    use roccat_vulcan::keymap;
    use vulcan_rgb_core::{KeyColor, Result};

    use super::*;

    #[derive(Default)]
    struct Script(VecDeque<Vec<RawEvent>>);

    impl EventSource for Script {
        fn drain(&mut self, out: &mut Vec<RawEvent>) -> std::io::Result<()> {
            out.extend(self.0.pop_front().unwrap_or_default());
            Ok(())
        }
    }

    /// Records every frame instead of sending it
    #[derive(Default)]
    pub struct Frames {
        pub sent: Vec<(KeyColorMap, PinTable)>,
        pub unplugged: bool,
    }

    impl HasPerKeyLighting for Frames {
        fn enable_host_lighting(&mut self) -> Result<()> {
            Ok(())
        }

        fn send_frame(&mut self, map: Option<&KeyColorMap>, pins: &PinTable) -> Result<()> {
            if self.unplugged {
                return Err(BoardError::Transmission {
                    chunk: 0,
                    written: 0,
                    expected: 65,
                });
            }
            self.sent.push((map.cloned().unwrap_or_default(), pins.clone()));
            Ok(())
        }
    }

    fn palette() -> Palette {
        Palette {
            base: KeyColor::new(0, 0, 0x77),
            active: KeyColor::new(255, 0, 0),
        }
    }

    #[test]
    fn frames_only_on_change() {
        let key = keymap::lookup(30).unwrap();
        let mut pins = PinTable::default();
        pins.pin(keymap::lookup(1).unwrap(), KeyColor::new(0, 255, 0));
        let mut session = Session::new(pins.clone(), palette());
        let mut source = Script(VecDeque::from([
            vec![],
            vec![],
            vec![RawEvent::key(30, 1)],
            vec![RawEvent::key(30, 2)],
            vec![RawEvent::key(30, 0)],
        ]));
        let mut frames = Frames::default();

        let sent: Vec<bool> = (0..5)
            .map(|_| session.tick(&mut source, &mut frames).unwrap())
            .collect();
        assert_eq!(sent, [true, false, true, true, true]);

        assert_eq!(frames.sent[0].0[key], palette().base);
        assert_eq!(frames.sent[1].0[key], palette().active);
        assert_eq!(frames.sent[2].0[key], palette().active);
        assert_eq!(frames.sent[3].0[key], palette().base);
        assert!(frames.sent.iter().all(|(_, p)| *p == pins));

        session.reset();
        assert!(session.tick(&mut source, &mut frames).unwrap());
    }

    #[test]
    fn send_failure_ends_tick() {
        let mut session = Session::new(PinTable::default(), palette());
        let mut frames = Frames {
            unplugged: true,
            ..Default::default()
        };
        let err = session
            .tick(&mut Script::default(), &mut frames)
            .unwrap_err();
        assert!(matches!(err, BoardError::Transmission { .. }));
    }

    #[test]
    fn reactive_needs_input_device() {
        let mut driver = Reactive::new(Session::new(PinTable::default(), palette()));
        let err = driver.tick(&mut Frames::default()).unwrap_err();
        assert!(matches!(err, BoardError::InputNotFound));
    }

    #[test]
    fn fatal_errors() {
        let unknown: Box<dyn Error> = BoardError::UnknownReport(0x42).into();
        let missing: Box<dyn Error> = BoardError::DeviceNotFound.into();
        let lost: Box<dyn Error> = BoardError::InputLost(std::io::Error::other("gone")).into();
        let unsupported: Box<dyn Error> = "board does not support per-key lighting".into();
        assert!(is_fatal(unknown.as_ref()));
        assert!(!is_fatal(missing.as_ref()));
        assert!(!is_fatal(lost.as_ref()));
        assert!(is_fatal(unsupported.as_ref()));
    }
}
