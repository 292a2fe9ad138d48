// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! STM32F0 flash algorithms.

use static_assertions::const_assert;
use swdburner_core::flash::{FlashAlgorithm, SectorInfo, SyscallFrame};

const STM32F0XX_256_2K_CODE: [u32; 79] = [
    0xE00ABE00, 0x49454846, 0x49466041, 0x21006041,
    0x68C16001, 0x43112214, 0x69C060C1, 0xD4060740,
    0x49414842, 0x21066001, 0x49416041, 0x20006081,
    0x483B4770, 0x22806901, 0x61014311, 0x47702000,
    0x4837B530, 0x241468C1, 0x60C14321, 0x25046901,
    0x61014329, 0x22406901, 0x61014311, 0x4A334935,
    0x6011E000, 0x07DB68C3, 0x6901D1FB, 0x610143A9,
    0x422168C1, 0x68C1D004, 0x60C14321, 0xBD302001,
    0xBD302000, 0x4926B530, 0x231468CA, 0x60CA431A,
    0x2402690A, 0x610A4322, 0x69086148, 0x43102240,
    0x48246108, 0xE0004A21, 0x68CD6010, 0xD1FB07ED,
    0x43A06908, 0x68C86108, 0xD0034018, 0x431868C8,
    0x200160C8, 0xB5F0BD30, 0x1C494D15, 0x68EB0849,
    0x24040049, 0x60EB4323, 0x4C162714, 0x692BE01A,
    0x43332601, 0x8813612B, 0x4B108003, 0x601CE000,
    0x07F668EE, 0x692BD1FB, 0x005B085B, 0x68EB612B,
    0xD004423B, 0x433868E8, 0x200160E8, 0x1C80BDF0,
    0x1C921E89, 0xD1E22900, 0xBDF02000, 0x45670123,
    0x40022000, 0xCDEF89AB, 0x00005555, 0x40003000,
    0x00000FFF, 0x0000AAAA, 0x00000000,
];

const_assert!(STM32F0XX_256_2K_CODE.len() * 4 <= 0x400);

const STM32F0XX_256_2K_SECTORS: [SectorInfo; 1] = [
    SectorInfo::new(0x800, 0x000000),
];

/// STM32F0xx_256_2K
pub static STM32F0XX_256_2K: FlashAlgorithm = FlashAlgorithm {
    name: "STM32F0xx_256_2K",
    init: 0x20000005,
    uninit: Some(0x20000033),
    erase_chip: 0x20000041,
    erase_sector: 0x20000085,
    program_page: 0x200000C7,
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
    algo_blob: &STM32F0XX_256_2K_CODE,
    sectors: &STM32F0XX_256_2K_SECTORS,
};

const STM32F0XX_64_1K_SECTORS: [SectorInfo; 1] = [
    SectorInfo::new(0x400, 0x000000),
];

/// STM32F0xx_64_1K
pub static STM32F0XX_64_1K: FlashAlgorithm = FlashAlgorithm {
    name: "STM32F0xx_64_1K",
    init: 0x20000005,
    uninit: Some(0x20000033),
    erase_chip: 0x20000041,
    erase_sector: 0x20000085,
    program_page: 0x200000C7,
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
    algo_blob: &STM32F0XX_256_2K_CODE,
    sectors: &STM32F0XX_64_1K_SECTORS,
};

const STM32F0XX_OPT_CODE: [u32; 93] = [
    0xE00ABE00, 0x4A524853, 0x49536042, 0x60826041,
    0x21006081, 0x68C16001, 0x43112214, 0x69C060C1,
    0xD4060740, 0x494D484E, 0x21066001, 0x494D6041,
    0x20006081, 0x48474770, 0x22806901, 0x61014311,
    0x15826901, 0x61014391, 0x47702000, 0x4841B570,
    0x231468C1, 0x60C14319, 0x24206901, 0x61014321,
    0x22406901, 0x61014311, 0x4A3D493F, 0x6011E000,
    0x07ED68C5, 0x6905D1FB, 0x610543A5, 0x24106905,
    0x61054325, 0x4E394D35, 0x80353555, 0x6011E000,
    0x07ED68C5, 0x6901D1FB, 0x610143A1, 0x421968C1,
    0x68C1D004, 0x60C14319, 0xBD702001, 0xBD702000,
    0x4828B530, 0x241468C1, 0x60C14321, 0x25206901,
    0x61014329, 0x22406901, 0x61014311, 0x4A244926,
    0x6011E000, 0x07DB68C3, 0x6901D1FB, 0x610143A9,
    0x422168C1, 0x68C1D004, 0x60C14321, 0xBD302001,
    0xBD302000, 0x47702001, 0x4D16B5F0, 0x08491C49,
    0x004968EB, 0x43232404, 0x261060EB, 0xE01A4B16,
    0x4334692C, 0x8814612C, 0x4C118004, 0x6023E000,
    0x07FF68EF, 0x692CD1FB, 0x612C43B4, 0x271468EC,
    0xD005423C, 0x211468E8, 0x60E84308, 0xBDF02001,
    0x1E891C80, 0x29001C92, 0x2000D1E2, 0x0000BDF0,
    0x45670123, 0x40022000, 0xCDEF89AB, 0x00005555,
    0x40003000, 0x00000FFF, 0x0000AAAA, 0x1FFFF800,
    0x00000000,
];

const_assert!(STM32F0XX_OPT_CODE.len() * 4 <= 0x400);

const STM32F0XX_OPT_SECTORS: [SectorInfo; 1] = [
    SectorInfo::new(0x10, 0x000000),
];

/// STM32F0xx_OPT
pub static STM32F0XX_OPT: FlashAlgorithm = FlashAlgorithm {
    name: "STM32F0xx_OPT",
    init: 0x20000005,
    uninit: Some(0x20000037),
    erase_chip: 0x2000004D,
    erase_sector: 0x200000B1,
    program_page: 0x200000F9,
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
    algo_blob: &STM32F0XX_OPT_CODE,
    sectors: &STM32F0XX_OPT_SECTORS,
};
