// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! STM32F3 flash algorithms.

use static_assertions::const_assert;
use swdburner_core::flash::{FlashAlgorithm, SectorInfo, SyscallFrame};

const STM32F3XX_512_CODE: [u32; 64] = [
    0xE00ABE00, 0x49364837, 0x49376041, 0x21006041,
    0x68C16001, 0x43112214, 0x69C060C1, 0xD40605C0,
    0x49324833, 0x21066001, 0x49326041, 0x20006081,
    0x482C4770, 0x22806901, 0x61014311, 0x47702000,
    0x4828B510, 0x24046901, 0x61014321, 0x22406901,
    0x61014311, 0x4A264928, 0x6011E000, 0x07DB68C3,
    0x6901D1FB, 0x610143A1, 0xBD102000, 0x491DB510,
    0x2402690A, 0x610A4322, 0x69086148, 0x43102240,
    0x481D6108, 0xE0004A1A, 0x68CB6010, 0xD1FB07DB,
    0x43A06908, 0x20006108, 0xB570BD10, 0x08491C49,
    0x26140049, 0x23014D0F, 0x692CE016, 0x612C431C,
    0x80048814, 0x07E468EC, 0x692CD1FC, 0x00640864,
    0x68EC612C, 0xD0044234, 0x433068E8, 0x200160E8,
    0x1C80BD70, 0x1C921E89, 0xD1E62900, 0xBD702000,
    0x45670123, 0x40022000, 0xCDEF89AB, 0x00005555,
    0x40003000, 0x00000FFF, 0x0000AAAA, 0x00000000,
];

const_assert!(STM32F3XX_512_CODE.len() * 4 <= 0x400);

const STM32F3XX_512_SECTORS: [SectorInfo; 1] = [
    SectorInfo::new(0x800, 0x000000),
];

/// STM32F3xx_512
pub static STM32F3XX_512: FlashAlgorithm = FlashAlgorithm {
    name: "STM32F3xx_512",
    init: 0x20000005,
    uninit: Some(0x20000033),
    erase_chip: 0x20000041,
    erase_sector: 0x2000006D,
    program_page: 0x2000009B,
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
    algo_blob: &STM32F3XX_512_CODE,
    sectors: &STM32F3XX_512_SECTORS,
};
