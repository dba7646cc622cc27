//! Reset and exception plumbing for the AT91SAM7S256.
//!
//! There is no runtime crate for ARM7TDMI, so the whole boot path is
//! spelled out here: the exception vector table, clock bring-up to
//! 48 MHz, mode stacks, `.data`/`.bss` initialization, and the IRQ
//! veneer that the scheduler piggybacks on. Section placement comes from
//! `link.ld` at the repository root.
//!
//! The IRQ veneer is the contract behind `sched::IRQ_TASK_SP`: on entry
//! it saves the interrupted task's full context frame (saved CPSR,
//! r0–r12, sp, lr, pc — 17 words) onto that task's own stack and
//! publishes the frame pointer; after dispatching through AIC_IVR it
//! restores whichever frame pointer is published. A tick handler that
//! swaps the pointer has thereby switched tasks.

use core::arch::global_asm;

global_asm!(
    r#"
    .section .vectors, "ax"
    .arm
    .global __vectors
__vectors:
    ldr     pc, =reset_entry
    ldr     pc, =exception_trap     @ undefined instruction
    ldr     pc, =exception_trap     @ software interrupt
    ldr     pc, =exception_trap     @ prefetch abort
    ldr     pc, =exception_trap     @ data abort
    nop                             @ reserved
    ldr     pc, =irq_entry
    ldr     pc, =exception_trap     @ fiq (unused)

    .section .text.boot, "ax"
    .arm
    .global reset_entry
reset_entry:
    @ Flash: 1 wait state, microsecond cycle count for 48 MHz.
    ldr     r0, =0xFFFFFF60         @ MC_FMR
    ldr     r1, =0x00480100
    str     r1, [r0]

    @ Main oscillator on (18.432 MHz crystal), wait for MOSCS.
    ldr     r0, =0xFFFFFC20         @ CKGR_MOR
    ldr     r1, =0x00000601
    str     r1, [r0]
    ldr     r0, =0xFFFFFC68         @ PMC_SR
1:  ldr     r1, [r0]
    tst     r1, #(1 << 0)
    beq     1b

    @ PLL: 18.432 MHz / 14 * 73 = 96.1 MHz, USB divider /2; wait LOCK.
    ldr     r0, =0xFFFFFC2C         @ CKGR_PLLR
    ldr     r1, =0x10481C0E
    str     r1, [r0]
    ldr     r0, =0xFFFFFC68
1:  ldr     r1, [r0]
    tst     r1, #(1 << 2)
    beq     1b

    @ MCK = PLL / 2 = 48 MHz. Prescaler first, then source, with a
    @ MCKRDY wait after each write, per the datasheet's ordering rule.
    ldr     r0, =0xFFFFFC30         @ PMC_MCKR
    ldr     r1, =0x00000004
    str     r1, [r0]
    ldr     r2, =0xFFFFFC68
1:  ldr     r1, [r2]
    tst     r1, #(1 << 3)
    beq     1b
    ldr     r1, =0x00000007
    str     r1, [r0]
1:  ldr     r1, [r2]
    tst     r1, #(1 << 3)
    beq     1b

    @ Mode stacks: a small IRQ stack, boot continues on the system stack.
    msr     cpsr_c, #0xD2           @ IRQ mode, IRQs/FIQs masked
    ldr     sp, =__irq_stack_top
    msr     cpsr_c, #0xDF           @ System mode, IRQs/FIQs masked
    ldr     sp, =__sys_stack_top

    @ .data from flash, .bss zeroed.
    ldr     r0, =__sidata
    ldr     r1, =__sdata
    ldr     r2, =__edata
1:  cmp     r1, r2
    ldrlo   r3, [r0], #4
    strlo   r3, [r1], #4
    blo     1b
    mov     r3, #0
    ldr     r1, =__sbss
    ldr     r2, =__ebss
1:  cmp     r1, r2
    strlo   r3, [r1], #4
    blo     1b

    bl      kernel_start

exception_trap:
    b       exception_trap

    @ --- IRQ veneer -------------------------------------------------
    .section .text.irq, "ax"
    .arm
    .global irq_entry
irq_entry:
    sub     lr, lr, #4              @ correct the return address

    @ Save the interrupted task's context onto its own (system) stack.
    stmdb   sp!, {{r0}}             @ park r0 on the IRQ stack
    stmdb   sp, {{sp}}^             @ fetch the task's sp
    nop
    sub     sp, sp, #4
    ldmia   sp!, {{r0}}             @ r0 = task sp
    stmdb   r0!, {{lr}}             @ frame[16]: task pc
    mov     lr, r0
    ldmia   sp!, {{r0}}             @ unpark r0
    stmdb   lr, {{r0-lr}}^          @ frame[1..15]: task r0-r14
    nop
    sub     lr, lr, #60
    mrs     r0, spsr
    stmdb   lr!, {{r0}}             @ frame[0]: task cpsr
    ldr     r0, =IRQ_TASK_SP
    str     lr, [r0]

    @ Dispatch: AIC_IVR hands out the handler installed for the source.
    ldr     r1, =0xFFFFF100         @ AIC_IVR
    ldr     r0, [r1]
    mov     lr, pc
    bx      r0
    ldr     r0, =0xFFFFF130         @ AIC_EOICR
    str     r0, [r0]

    @ Resume whatever frame is now published (the tick handler may have
    @ swapped it for another task's).
    ldr     r0, =IRQ_TASK_SP
    ldr     lr, [r0]
    ldmia   lr!, {{r0}}
    msr     spsr_cxsf, r0
    ldmia   lr, {{r0-r14}}^
    nop
    ldr     lr, [lr, #60]
    movs    pc, lr
"#
);
