// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! STM32F2 flash algorithms.

use static_assertions::const_assert;
use swdburner_core::flash::{FlashAlgorithm, SectorInfo, SyscallFrame};

const STM32F2XX_OPT_CODE: [u32; 57] = [
    0xE00ABE00, 0x0E000300, 0xD3022820, 0x1D000940,
    0x28104770, 0x0900D302, 0x47701CC0, 0x47700880,
    0x49284829, 0x49296081, 0x68C16081, 0x431122F0,
    0x694060C1, 0xD4060680, 0x49254826, 0x21066001,
    0x49256041, 0x20006081, 0x481F4770, 0x22016941,
    0x61414311, 0x47702000, 0x68C2481B, 0x430A21F0,
    0x4A1E60C2, 0x69426142, 0x431A2302, 0x68C26142,
    0x0F120612, 0x68C2D004, 0x60C2430A, 0x47702001,
    0x47702000, 0x47702000, 0x88108911, 0x09090509,
    0x00800880, 0x480C4301, 0x22F068C3, 0x60C34313,
    0x43192302, 0x68C16141, 0xD4FC03C9, 0x060968C1,
    0xD0040F09, 0x431168C1, 0x200160C1, 0x20004770,
    0x00004770, 0x08192A3B, 0x40023C00, 0x4C5D6E7F,
    0x00005555, 0x40003000, 0x00000FFF, 0x0FFFAAEC,
    0x00000000,
];

const_assert!(STM32F2XX_OPT_CODE.len() * 4 <= 0x400);

const STM32F2XX_OPT_SECTORS: [SectorInfo; 1] = [
    SectorInfo::new(0x10, 0x000000),
];

/// STM32F2xx_OPT
pub static STM32F2XX_OPT: FlashAlgorithm = FlashAlgorithm {
    name: "STM32F2xx_OPT",
    init: 0x20000021,
    uninit: Some(0x2000004B),
    erase_chip: 0x20000059,
    erase_sector: 0x20000085,
    program_page: 0x20000089,
    verify: None,
    set_read_protect: None,
    frame: SyscallFrame {
        breakpoint: 0x20000001,
        static_base: 0x20000800,
        stack_pointer: 0x20000C00,
    },
    program_buffer: 0x20000400,
    program_buffer_size: 0x400,
    algo_start: 0x20000000,
    algo_blob: &STM32F2XX_OPT_CODE,
    sectors: &STM32F2XX_OPT_SECTORS,
};
