use embedded_hal::spi::SpiBus as _;
use fugit::ExtU32;
use serial_xfer::{
    spi::BlockingSpi, Buffers, CompletionMode, EventQueue, Outcome, Signal, TransferRequest,
    WordSize,
};

use super::{drain, leak, spi_bus, testdata, IrqDelay, SpiBus, Stalled};

/// Fires the interrupt until the bus is idle.
fn run_to_idle(bus: &SpiBus) {
    for _ in 0..1000 {
        if bus.is_idle() {
            return;
        }
        bus.on_interrupt();
    }
    panic!("bus never went idle");
}

/// Moves `words` words of the active transfer, the way the hardware would
/// between two looks at it.
fn advance(bus: &SpiBus, mode: CompletionMode, words: usize) {
    match mode {
        CompletionMode::Interrupt => (0..words).for_each(|_| bus.on_interrupt()),
        CompletionMode::Dma => {
            bus.with_backend(|spi| spi.clock(words));
        }
    }
}

pub fn single_byte_reaches_the_wire(mode: CompletionMode) {
    let bus = spi_bus(mode);
    let mut delay = IrqDelay::new(&bus);
    let event = bus
        .transfer_and_wait((), Buffers::write(&[0x5A]), 10.millis(), &mut delay)
        .unwrap();
    assert_eq!(event.outcome, Outcome::Complete);
    assert_eq!(event.words, 1);
    assert!(delay.naps >= 1);
    bus.with_backend(|spi| assert_eq!(spi.captured(), &[0x5A]));
    assert!(bus.is_idle());
}

pub fn tx_only_and_tx_rx(mode: CompletionMode) {
    let bus = spi_bus(mode);
    let mut delay = IrqDelay::new(&bus);

    let event = bus
        .transfer_and_wait((), Buffers::write(&testdata::MESSAGE), 1.secs(), &mut delay)
        .unwrap();
    assert_eq!(event.into_result(), Ok(4));

    let mut rx = [0u8; 4];
    let event = bus
        .transfer_and_wait(
            (),
            Buffers::transfer(&testdata::MESSAGE, &mut rx),
            1.secs(),
            &mut delay,
        )
        .unwrap();
    assert_eq!(event.into_result(), Ok(4));
    assert_eq!(rx, testdata::MESSAGE);
    bus.with_backend(|spi| {
        assert_eq!(&spi.captured()[..4], &testdata::MESSAGE);
        assert_eq!(&spi.captured()[4..], &testdata::MESSAGE);
    });
}

pub fn rx_only_clocks_fill(mode: CompletionMode) {
    let bus = spi_bus(mode);
    let mut delay = IrqDelay::new(&bus);
    let mut rx = [0u8; 3];
    bus.transfer_and_wait((), Buffers::read(&mut rx), 1.secs(), &mut delay)
        .unwrap();
    assert_eq!(rx, [0xFF; 3]);
    bus.with_backend(|spi| assert_eq!(spi.captured(), &[0xFF; 3]));
}

pub fn short_tx_is_padded(mode: CompletionMode) {
    let bus = spi_bus(mode);
    let mut delay = IrqDelay::new(&bus);
    let mut rx = [testdata::UNTOUCHED; 4];
    let event = bus
        .transfer_and_wait((), Buffers::transfer(&[1, 2], &mut rx), 1.secs(), &mut delay)
        .unwrap();
    assert_eq!(event.words, 4);
    assert_eq!(rx, [1, 2, 0xFF, 0xFF]);
}

pub fn wide_words_go_msb_first(mode: CompletionMode) {
    let bus = spi_bus(mode);
    let mut delay = IrqDelay::new(&bus);
    let words: [u16; 2] = [0x1234, 0xABCD];
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
    let mut rx = [0u8; 4];
    let event = bus
        .transfer_and_wait(
            (),
            Buffers::transfer(&bytes, &mut rx).word_size(WordSize::Bits16),
            1.secs(),
            &mut delay,
        )
        .unwrap();
    assert_eq!(event.words, 2);
    bus.with_backend(|spi| assert_eq!(spi.captured(), &[0x12, 0x34, 0xAB, 0xCD]));
    assert_eq!(u16::from_be_bytes([rx[2], rx[3]]), 0xABCD);
}

/// Two 32 byte transfers back to back, the first aborted part way.
pub fn abort_first_of_two(mode: CompletionMode) {
    let bus = spi_bus(mode);
    let tx: &'static [u8; 32] = leak(testdata::long_message());
    let rx_a: &'static mut [u8; 32] = leak([testdata::UNTOUCHED; 32]);
    let rx_b: &'static mut [u8; 32] = leak([testdata::UNTOUCHED; 32]);
    let rx_a_ptr = rx_a.as_ptr();
    let rx_b_ptr = rx_b.as_ptr();
    let done_a: &'static Signal = leak(Signal::new());
    let done_b: &'static Signal = leak(Signal::new());

    let a = bus
        .submit(TransferRequest::new((), Buffers::transfer(tx, rx_a), done_a))
        .unwrap();
    let b = bus
        .submit(TransferRequest::new((), Buffers::transfer(tx, rx_b), done_b))
        .unwrap();

    advance(&bus, mode, 5);
    assert_eq!(bus.abort_current(), Some(a));

    let aborted = done_a.take().unwrap();
    assert_eq!(aborted.id, a);
    assert_eq!(aborted.outcome, Outcome::Aborted);
    assert!(aborted.words > 0 && aborted.words < 32);
    // SAFETY: the request is finished, the engine no longer writes here.
    let rx_a = unsafe { core::slice::from_raw_parts(rx_a_ptr, 32) };
    assert_eq!(&rx_a[..aborted.words], &tx[..aborted.words]);
    assert!(rx_a[aborted.words..].iter().all(|&b| b == testdata::UNTOUCHED));

    run_to_idle(&bus);
    let finished = done_b.take().unwrap();
    assert_eq!((finished.id, finished.outcome, finished.words), (b, Outcome::Complete, 32));
    // SAFETY: as above.
    let rx_b = unsafe { core::slice::from_raw_parts(rx_b_ptr, 32) };
    assert_eq!(rx_b, &tx[..]);
    assert!(done_a.take().is_none());
}

/// Every request gets exactly one event, in submission order, whatever
/// mix of lengths, empties and aborts it goes through.
pub fn one_event_per_request_in_order(mode: CompletionMode) {
    let bus = spi_bus(mode);
    let events: &'static EventQueue<64> = leak(EventQueue::new());
    let lengths = [3usize, 0, 1, 7, 0, 0, 2, 5, 4, 1, 0];
    let mut submitted = Vec::new();
    let mut aborted = Vec::new();

    for (round, chunk) in lengths.chunks(3).enumerate() {
        for &len in chunk {
            let tx: &'static [u8] = leak(vec![round as u8; len]);
            let id = bus
                .submit(TransferRequest::new((), Buffers::write(tx), events))
                .unwrap();
            submitted.push(id);
        }
        advance(&bus, mode, 1);
        if round % 2 == 1 {
            aborted.extend(bus.abort_current());
        }
        if round == 2 {
            // leave a backlog behind for the last round
            continue;
        }
        run_to_idle(&bus);
    }
    run_to_idle(&bus);

    let seen = drain(events);
    assert_eq!(seen.len(), submitted.len());
    let ids: Vec<_> = seen.iter().map(|e| e.id).collect();
    assert_eq!(ids, submitted);
    for event in &seen {
        let expected = if aborted.contains(&event.id) {
            Outcome::Aborted
        } else {
            Outcome::Complete
        };
        assert_eq!(event.outcome, expected);
    }
    assert_eq!(events.dropped(), 0);
}

/// Freeing a bus and building a new one from the same backend behaves like
/// a fresh bus.
pub fn rebuilt_bus_matches_fresh(mode: CompletionMode) {
    let run = |bus: &SpiBus| {
        let mut rx = [0u8; 4];
        let mut delay = IrqDelay::new(bus);
        bus.with_backend(|spi| spi.clear_capture());
        let event = bus
            .transfer_and_wait(
                (),
                Buffers::transfer(&testdata::MESSAGE, &mut rx),
                1.secs(),
                &mut delay,
            )
            .unwrap();
        let capture = bus.with_backend(|spi| spi.captured().to_vec());
        (event.outcome, event.words, rx, capture)
    };

    let fresh = run(&spi_bus(mode));

    let used = spi_bus(mode);
    let events: &'static EventQueue<4> = leak(EventQueue::new());
    used.submit(TransferRequest::new((), Buffers::write(leak([9u8; 8])), events))
        .unwrap();
    advance(&used, mode, 3);
    let backend = used.free();
    assert_eq!(drain(events).len(), 1);

    let rebuilt = serial_xfer::Bus::<_, 4>::new(backend, serial_xfer::Config::new());
    assert!(rebuilt.is_idle());
    assert_eq!(run(&rebuilt), fresh);
}

/// Two buses side by side do not see each other's requests.
pub fn instances_are_independent(mode: CompletionMode) {
    let first = spi_bus(mode);
    let second = spi_bus(mode);
    let events: &'static EventQueue<4> = leak(EventQueue::new());
    first
        .submit(TransferRequest::new((), Buffers::write(&testdata::MESSAGE), events))
        .unwrap();

    let mut delay = IrqDelay::new(&second);
    second
        .transfer_and_wait((), Buffers::write(&[0x77]), 1.secs(), &mut delay)
        .unwrap();
    assert!(!first.is_idle());
    assert!(events.is_empty());
    drop(second);

    run_to_idle(&first);
    assert_eq!(drain(events).len(), 1);
    first.with_backend(|spi| assert_eq!(spi.captured(), &testdata::MESSAGE));
}

pub fn embedded_hal_spi_bus(mode: CompletionMode) {
    let bus = spi_bus(mode);
    let mut spi = BlockingSpi::new(&bus, IrqDelay::new(&bus));

    spi.write(&testdata::MESSAGE).unwrap();
    let mut rx = [0u8; 4];
    spi.transfer(&mut rx, &testdata::MESSAGE).unwrap();
    assert_eq!(rx, testdata::MESSAGE);
    let mut buf = [0xC3u8, 0x3C];
    spi.transfer_in_place(&mut buf).unwrap();
    assert_eq!(buf, [0xC3, 0x3C]);
    spi.flush().unwrap();

    assert_eq!(spi.transfer_word(WordSize::Bits8, 0x42), Ok(0x42));
    assert_eq!(spi.transfer_word(WordSize::Bits32, 0xDEAD_BEEF), Ok(0xDEAD_BEEF));
    let delay = spi.free();
    assert!(delay.naps > 0);
}

pub fn stalled_spi_times_out(mode: CompletionMode) {
    let bus = spi_bus(mode);
    let mut spi = BlockingSpi::new(&bus, Stalled::default()).with_timeout(50.micros());
    assert_eq!(
        spi.write(&testdata::MESSAGE),
        Err(serial_xfer::Error::Timeout)
    );
    assert!(bus.is_idle());
}
